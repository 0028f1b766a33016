use std::fmt;
use std::str::FromStr;

use bon::Builder;
use der::asn1::{GeneralizedTime, Ia5StringRef, PrintableStringRef, SetOfVec, UtcTime};
use der::oid::ObjectIdentifier;
use der::{Any, DateTime, Encode, Tag};
use rand_core::{OsRng, RngCore};
use time::{Duration, OffsetDateTime, UtcOffset};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use crate::error::{CertVaultError, Result};
use crate::key::PublicKey;

/// Length of generated serial numbers in bytes.
pub const SERIAL_NUMBER_LEN: usize = 16;

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `is_ca` - Indicates if the certificate may sign other certificates.
#[derive(Clone, Debug, Builder)]
pub struct CertificateParams {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub is_ca: bool,
}

/// A subject or issuer name.
///
/// Parsed from the familiar comma separated form, most specific attribute
/// first (`CN=Alice, O=ENSISA, C=FR`), and rendered back in the same order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistinguishedName(RdnSequence);

impl DistinguishedName {
    /// Parses a distinguished name, tolerating whitespace around separators.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = |reason: &str| CertVaultError::InvalidDistinguishedNameError {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }

        let mut rdns = Vec::new();
        for part in split_unescaped(name, ',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid("empty relative distinguished name"));
            }
            let rdn = RelativeDistinguishedName::from_str(part)
                .and_then(with_printable_country)
                .map_err(|e| invalid(&format!("'{part}': {e}")))?;
            rdns.push(rdn);
        }

        // The textual form lists the most specific RDN first, DER the reverse.
        rdns.reverse();
        Ok(Self(RdnSequence(rdns)))
    }

    pub fn as_x509_name(&self) -> &x509_cert::name::Name {
        &self.0
    }

    pub fn from_x509_name(name: x509_cert::name::Name) -> Self {
        Self(name)
    }

    /// Returns the first common name (CN) attribute, if any.
    pub fn common_name(&self) -> Option<String> {
        self.0
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|attr| attr.oid.to_string() == "2.5.4.3")
            .and_then(attribute_value)
    }
}

impl FromStr for DistinguishedName {
    type Err = CertVaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .0
            .iter()
            .rev()
            .map(|rdn| {
                rdn.0
                    .iter()
                    .map(render_attribute)
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect::<Vec<_>>();
        f.write_str(&rendered.join(", "))
    }
}

const ATTRIBUTE_NAMES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.5", "SERIALNUMBER"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("0.9.2342.19200300.100.1.1", "UID"),
    ("0.9.2342.19200300.100.1.25", "DC"),
    ("1.2.840.113549.1.9.1", "EMAILADDRESS"),
];

const COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");

/// countryName is a PrintableString (RFC 5280 appendix A.1), while the text
/// parser produces UTF8String for every attribute.
fn with_printable_country(rdn: RelativeDistinguishedName) -> der::Result<RelativeDistinguishedName> {
    let attributes = rdn
        .0
        .iter()
        .map(|attr| {
            if attr.oid != COUNTRY_NAME {
                return Ok(attr.clone());
            }
            let Some(value) = attribute_value(attr) else {
                return Ok(attr.clone());
            };
            PrintableStringRef::new(&value)?;
            Ok(AttributeTypeAndValue {
                oid: attr.oid,
                value: Any::new(Tag::PrintableString, value.as_bytes())?,
            })
        })
        .collect::<der::Result<Vec<_>>>()?;
    Ok(RelativeDistinguishedName(SetOfVec::try_from(attributes)?))
}

fn render_attribute(attr: &AttributeTypeAndValue) -> String {
    let oid = attr.oid.to_string();
    let key = ATTRIBUTE_NAMES
        .iter()
        .find(|(dotted, _)| *dotted == oid)
        .map(|(_, short)| short.to_string())
        .unwrap_or(oid);

    match attribute_value(attr) {
        Some(value) => format!("{key}={}", escape_value(&value)),
        None => {
            let raw = attr.value.to_der().unwrap_or_default();
            let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();
            format!("{key}=#{hex}")
        }
    }
}

fn attribute_value(attr: &AttributeTypeAndValue) -> Option<String> {
    if let Ok(s) = attr.value.decode_as::<String>() {
        return Some(s);
    }
    if let Ok(s) = attr.value.decode_as::<PrintableStringRef<'_>>() {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = attr.value.decode_as::<Ia5StringRef<'_>>() {
        return Some(s.as_str().to_string());
    }
    None
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn split_unescaped(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Certificate validity period.
///
/// Both instants are held in UTC at whole-second precision, the resolution
/// X.509 time fields can carry, so a certificate reports exactly the window it
/// was built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validity {
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period, rejecting windows where `not_after` does not
    /// come strictly after `not_before`.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Result<Self> {
        let not_before = truncate_to_second(not_before);
        let not_after = truncate_to_second(not_after);

        if not_after <= not_before {
            return Err(CertVaultError::InvalidValidityError(format!(
                "not after ({not_after}) must be later than not before ({not_before})"
            )));
        }

        // Both ends must fit into an X.509 time field.
        to_x509_time(not_before)?;
        to_x509_time(not_after)?;

        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Result<Self> {
        let now = OffsetDateTime::now_utc();
        let out_of_range = || {
            CertVaultError::InvalidValidityError(format!("{days} days from {now} is out of range"))
        };
        let seconds = days.checked_mul(86_400).ok_or_else(out_of_range)?;
        let not_after = now
            .checked_add(Duration::seconds(seconds))
            .ok_or_else(out_of_range)?;
        Self::new(now, not_after)
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }
}

fn truncate_to_second(at: OffsetDateTime) -> OffsetDateTime {
    let at = at.to_offset(UtcOffset::UTC);
    at - Duration::nanoseconds(i64::from(at.nanosecond()))
}

/// Converts an instant into the X.509 time encoding RFC 5280 asks for:
/// UTCTime through 2049, GeneralizedTime afterwards.
pub(crate) fn to_x509_time(at: OffsetDateTime) -> Result<x509_cert::time::Time> {
    let invalid = |reason: String| CertVaultError::InvalidValidityError(reason);

    let seconds = u64::try_from(at.unix_timestamp())
        .map_err(|_| invalid(format!("{at} is before the Unix epoch")))?;
    let date_time = DateTime::from_unix_duration(std::time::Duration::from_secs(seconds))
        .map_err(|e| invalid(format!("{at} cannot be encoded: {e}")))?;

    if date_time.year() < 2050 {
        let utc = UtcTime::from_date_time(date_time)
            .map_err(|e| invalid(format!("{at} cannot be encoded: {e}")))?;
        Ok(x509_cert::time::Time::UtcTime(utc))
    } else {
        Ok(x509_cert::time::Time::GeneralTime(
            GeneralizedTime::from_date_time(date_time),
        ))
    }
}

pub(crate) fn from_x509_time(time: &x509_cert::time::Time) -> Result<OffsetDateTime> {
    let since_epoch = match time {
        x509_cert::time::Time::UtcTime(ut) => ut.to_unix_duration(),
        x509_cert::time::Time::GeneralTime(gt) => gt.to_unix_duration(),
    };
    let seconds = i64::try_from(since_epoch.as_secs())
        .map_err(|e| CertVaultError::MalformedCertificateError(e.to_string()))?;
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| CertVaultError::MalformedCertificateError(e.to_string()))
}

/// Draws a fresh serial number from the OS CSPRNG.
///
/// The value carries 126 random bits. The top bit is cleared so the INTEGER
/// is positive and the next one is set so the encoding is minimal and never
/// zero.
pub fn generate_serial_number() -> Vec<u8> {
    let mut bytes = [0u8; SERIAL_NUMBER_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    bytes.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Tagged;

    const ALICE: &str = "CN=Alice-Subject, O=ENSISA, L=Mulhouse, ST=68, C=FR";

    #[test]
    fn distinguished_name_renders_in_input_order() {
        let dn = DistinguishedName::parse(ALICE).unwrap();
        assert_eq!(dn.to_string(), ALICE);
        assert_eq!(dn.common_name().as_deref(), Some("Alice-Subject"));
    }

    #[test]
    fn distinguished_name_normalizes_separators() {
        let compact = DistinguishedName::parse("CN=Bob-Issuer,O=DataPower,C=US").unwrap();
        let spaced = DistinguishedName::parse("CN=Bob-Issuer ,  O=DataPower, C=US").unwrap();
        assert_eq!(compact, spaced);
        assert_eq!(compact.to_string(), "CN=Bob-Issuer, O=DataPower, C=US");
    }

    #[test]
    fn distinguished_name_keeps_escaped_commas() {
        let dn = DistinguishedName::parse(r"CN=Doe\, Jane, O=Example").unwrap();
        assert_eq!(dn.common_name().as_deref(), Some("Doe, Jane"));
        assert_eq!(dn.to_string(), r"CN=Doe\, Jane, O=Example");
    }

    #[test]
    fn distinguished_name_rejects_garbage() {
        assert!(matches!(
            DistinguishedName::parse("   "),
            Err(CertVaultError::InvalidDistinguishedNameError { .. })
        ));
        assert!(matches!(
            DistinguishedName::parse("CN=Alice,,O=ENSISA"),
            Err(CertVaultError::InvalidDistinguishedNameError { .. })
        ));
        assert!(matches!(
            DistinguishedName::parse("not a name"),
            Err(CertVaultError::InvalidDistinguishedNameError { .. })
        ));
    }

    #[test]
    fn validity_requires_ordered_window() {
        let now = OffsetDateTime::now_utc();
        assert!(matches!(
            Validity::new(now, now),
            Err(CertVaultError::InvalidValidityError(_))
        ));
        assert!(matches!(
            Validity::new(now, now - Duration::days(1)),
            Err(CertVaultError::InvalidValidityError(_))
        ));
        assert!(Validity::new(now, now + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn validity_rejects_pre_epoch_instants() {
        let before_epoch = OffsetDateTime::UNIX_EPOCH - Duration::days(1);
        assert!(matches!(
            Validity::new(before_epoch, OffsetDateTime::now_utc()),
            Err(CertVaultError::InvalidValidityError(_))
        ));
    }

    #[test]
    fn validity_for_days_spans_exact_days() {
        let validity = Validity::for_days(365).unwrap();
        assert_eq!(
            validity.not_after() - validity.not_before(),
            Duration::days(365)
        );
        assert_eq!(validity.not_before().nanosecond(), 0);
    }

    #[test]
    fn validity_for_days_rejects_unrepresentable_spans() {
        for days in [10_000_000, i64::MAX / 10, i64::MAX, i64::MIN] {
            assert!(
                matches!(
                    Validity::for_days(days),
                    Err(CertVaultError::InvalidValidityError(_))
                ),
                "{days} days"
            );
        }
    }

    #[test]
    fn country_is_encoded_as_printable_string() {
        let dn = DistinguishedName::parse(ALICE).unwrap();
        let country = dn
            .as_x509_name()
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|attr| attr.oid == COUNTRY_NAME)
            .unwrap();
        assert_eq!(country.value.tag(), Tag::PrintableString);
        assert_eq!(dn.to_string(), ALICE);

        let common_name = dn
            .as_x509_name()
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|attr| attr.oid != COUNTRY_NAME)
            .unwrap();
        assert_eq!(common_name.value.tag(), Tag::Utf8String);
    }

    #[test]
    fn country_outside_printable_set_is_rejected() {
        assert!(matches!(
            DistinguishedName::parse("CN=Alice, C=F_R"),
            Err(CertVaultError::InvalidDistinguishedNameError { .. })
        ));
    }

    #[test]
    fn x509_time_switches_to_generalized_after_2049() {
        let late = OffsetDateTime::from_unix_timestamp(2_600_000_000).unwrap();
        assert!(matches!(
            to_x509_time(late).unwrap(),
            x509_cert::time::Time::GeneralTime(_)
        ));
        let early = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let encoded = to_x509_time(early).unwrap();
        assert!(matches!(encoded, x509_cert::time::Time::UtcTime(_)));
        assert_eq!(from_x509_time(&encoded).unwrap(), early);
    }

    #[test]
    fn serial_numbers_are_positive_and_distinct() {
        let a = generate_serial_number();
        let b = generate_serial_number();
        assert_eq!(a.len(), SERIAL_NUMBER_LEN);
        assert_eq!(a[0] & 0x80, 0);
        assert_ne!(a[0], 0);
        assert_ne!(a, b);
    }
}
