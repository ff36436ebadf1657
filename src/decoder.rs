use thiserror::Error;
use totp_rs::Secret;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpType {
    Totp,
    Hotp,
}

impl OtpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpType::Totp => "totp",
            OtpType::Hotp => "hotp",
        }
    }
}

/// Decoded form of an otpauth:// provisioning URI.
///
/// Exactly one of `period`/`counter` is set, determined by `otp_type`.
/// `secret` stays in its base32 text form (that is what gets persisted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCredential {
    pub otp_type: OtpType,
    pub secret: String,
    pub algorithm: String,
    pub digits: u16,
    pub period: Option<u32>,
    pub counter: Option<u64>,
}

impl DecodedCredential {
    /// Re-serialize as a provisioning URI. Semantically equivalent to the
    /// input of `decode`, not byte-identical (defaults are made explicit,
    /// parameter order is fixed).
    pub fn provisioning_uri(&self, label: &str) -> String {
        let mut uri = format!(
            "otpauth://{}/{}?secret={}&algorithm={}&digits={}",
            self.otp_type.as_str(),
            label,
            self.secret,
            self.algorithm,
            self.digits
        );
        if let Some(p) = self.period {
            uri.push_str(&format!("&period={p}"));
        }
        if let Some(c) = self.counter {
            uri.push_str(&format!("&counter={c}"));
        }
        uri
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a valid URI")]
    InvalidUri,
    #[error("unsupported otpauth type '{0}'")]
    UnsupportedType(String),
    #[error("missing 'secret' parameter")]
    MissingSecret,
    #[error("invalid '{0}' parameter")]
    InvalidParameter(&'static str),
}

fn parse_param<T: std::str::FromStr>(
    value: &str,
    name: &'static str,
) -> Result<T, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidParameter(name))
}

/// Decode an otpauth:// provisioning URI into its typed fields.
///
/// Pure function, no I/O. Defaults: algorithm SHA1, digits 6, period 30
/// (totp), counter 0 (hotp). A `period` on a hotp URI (or `counter` on a
/// totp one) is ignored.
pub fn decode(uri: &str) -> Result<DecodedCredential, DecodeError> {
    let url = Url::parse(uri).map_err(|_| DecodeError::InvalidUri)?;

    if url.scheme() != "otpauth" {
        return Err(DecodeError::UnsupportedType(url.scheme().to_string()));
    }

    let otp_type = match url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .as_deref()
    {
        Some("totp") => OtpType::Totp,
        Some("hotp") => OtpType::Hotp,
        other => {
            return Err(DecodeError::UnsupportedType(
                other.unwrap_or_default().to_string(),
            ));
        }
    };

    let mut secret: Option<String> = None;
    let mut algorithm: Option<String> = None;
    let mut digits: Option<u16> = None;
    let mut period: Option<u32> = None;
    let mut counter: Option<u64> = None;

    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "secret" => secret = Some(v.to_string()),
            "algorithm" => algorithm = Some(v.to_uppercase()),
            "digits" => digits = Some(parse_param(&v, "digits")?),
            "period" => period = Some(parse_param(&v, "period")?),
            "counter" => {
                let value: u64 = parse_param(&v, "counter")?;
                // integer columns store signed 64-bit values
                if value > i64::MAX as u64 {
                    return Err(DecodeError::InvalidParameter("counter"));
                }
                counter = Some(value);
            }
            _ => {}
        }
    }

    let secret = match secret {
        Some(s) if !s.is_empty() => s,
        _ => return Err(DecodeError::MissingSecret),
    };

    // Must decode as base32, same check the rest of the stack applies
    // before generating codes.
    Secret::Encoded(secret.clone())
        .to_bytes()
        .map_err(|_| DecodeError::InvalidParameter("secret"))?;

    // Any digest name is carried through as-is (uppercased); code
    // generation, not decoding, is where an unknown digest matters.
    let algorithm = algorithm.unwrap_or_else(|| "SHA1".to_string());
    if algorithm.is_empty() {
        return Err(DecodeError::InvalidParameter("algorithm"));
    }

    Ok(DecodedCredential {
        otp_type,
        secret,
        algorithm,
        digits: digits.unwrap_or(6),
        period: match otp_type {
            OtpType::Totp => Some(period.unwrap_or(30)),
            OtpType::Hotp => None,
        },
        counter: match otp_type {
            OtpType::Hotp => Some(counter.unwrap_or(0)),
            OtpType::Totp => None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totp_all_params() {
        let cred = decode(
            "otpauth://totp/Example:alice?secret=JBSWY3DPEHPK3PXP&algorithm=SHA1&digits=6&period=30",
        )
        .unwrap();
        assert_eq!(cred.otp_type, OtpType::Totp);
        assert_eq!(cred.secret, "JBSWY3DPEHPK3PXP");
        assert_eq!(cred.algorithm, "SHA1");
        assert_eq!(cred.digits, 6);
        assert_eq!(cred.period, Some(30));
        assert_eq!(cred.counter, None);
    }

    #[test]
    fn hotp_defaults() {
        let cred = decode("otpauth://hotp/Example:bob?secret=ABCDEF&counter=5").unwrap();
        assert_eq!(cred.otp_type, OtpType::Hotp);
        assert_eq!(cred.secret, "ABCDEF");
        assert_eq!(cred.algorithm, "SHA1");
        assert_eq!(cred.digits, 6);
        assert_eq!(cred.counter, Some(5));
        assert_eq!(cred.period, None);
    }

    #[test]
    fn totp_defaults() {
        let cred = decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(cred.digits, 6);
        assert_eq!(cred.algorithm, "SHA1");
        assert_eq!(cred.period, Some(30));
        assert_eq!(cred.counter, None);
    }

    #[test]
    fn default_counter_is_zero() {
        let cred = decode("otpauth://hotp/x?secret=JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(cred.counter, Some(0));
    }

    #[test]
    fn host_is_case_insensitive() {
        let cred = decode("otpauth://TOTP/x?secret=JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(cred.otp_type, OtpType::Totp);
    }

    #[test]
    fn counter_on_totp_is_ignored() {
        let cred = decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP&counter=9").unwrap();
        assert_eq!(cred.counter, None);
        assert_eq!(cred.period, Some(30));
    }

    #[test]
    fn period_on_hotp_is_ignored() {
        let cred = decode("otpauth://hotp/x?secret=JBSWY3DPEHPK3PXP&period=60").unwrap();
        assert_eq!(cred.period, None);
        assert_eq!(cred.counter, Some(0));
    }

    #[test]
    fn wrong_scheme() {
        assert_eq!(
            decode("ftp://bad"),
            Err(DecodeError::UnsupportedType("ftp".to_string()))
        );
    }

    #[test]
    fn unsupported_host() {
        assert_eq!(
            decode("otpauth://motp/x?secret=JBSWY3DPEHPK3PXP"),
            Err(DecodeError::UnsupportedType("motp".to_string()))
        );
    }

    #[test]
    fn missing_secret() {
        assert_eq!(decode("otpauth://totp/x"), Err(DecodeError::MissingSecret));
    }

    #[test]
    fn empty_secret() {
        assert_eq!(
            decode("otpauth://totp/x?secret="),
            Err(DecodeError::MissingSecret)
        );
    }

    #[test]
    fn non_base32_secret() {
        assert_eq!(
            decode("otpauth://totp/x?secret=notbase32!!"),
            Err(DecodeError::InvalidParameter("secret"))
        );
    }

    #[test]
    fn bad_digits() {
        assert_eq!(
            decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP&digits=six"),
            Err(DecodeError::InvalidParameter("digits"))
        );
        assert_eq!(
            decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP&digits=-1"),
            Err(DecodeError::InvalidParameter("digits"))
        );
    }

    #[test]
    fn bad_period() {
        assert_eq!(
            decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP&period=soon"),
            Err(DecodeError::InvalidParameter("period"))
        );
    }

    #[test]
    fn any_digest_name_is_carried() {
        let cred = decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP&algorithm=MD5").unwrap();
        assert_eq!(cred.algorithm, "MD5");
    }

    #[test]
    fn empty_algorithm_is_invalid() {
        assert_eq!(
            decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP&algorithm="),
            Err(DecodeError::InvalidParameter("algorithm"))
        );
    }

    #[test]
    fn counter_beyond_storage_range() {
        // 2^63, one past the largest value an integer column can hold
        assert_eq!(
            decode("otpauth://hotp/x?secret=JBSWY3DPEHPK3PXP&counter=9223372036854775808"),
            Err(DecodeError::InvalidParameter("counter"))
        );
        let cred =
            decode("otpauth://hotp/x?secret=JBSWY3DPEHPK3PXP&counter=9223372036854775807")
                .unwrap();
        assert_eq!(cred.counter, Some(i64::MAX as u64));
    }

    #[test]
    fn algorithm_normalized_uppercase() {
        let cred = decode("otpauth://totp/x?secret=JBSWY3DPEHPK3PXP&algorithm=sha256").unwrap();
        assert_eq!(cred.algorithm, "SHA256");
    }

    #[test]
    fn semantic_round_trip() {
        for uri in [
            "otpauth://totp/Example:alice?secret=JBSWY3DPEHPK3PXP&digits=8&period=60",
            "otpauth://hotp/Example:bob?secret=ABCDEF&counter=5",
            "otpauth://totp/plain?secret=JBSWY3DPEHPK3PXP",
        ] {
            let first = decode(uri).unwrap();
            let second = decode(&first.provisioning_uri("roundtrip")).unwrap();
            assert_eq!(first, second);
        }
    }
}
