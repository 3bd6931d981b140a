use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use url::Url;

use crate::error::AppError;

/// 160 bits, the RFC 4226 recommended shared secret length.
const SECRET_BYTES: usize = 20;

pub fn generate_secret() -> String {
    let mut raw = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    BASE32_NOPAD.encode(&raw)
}

/// Key URI understood by authenticator apps.
pub fn provisioning_uri(issuer: &str, account: &str, secret: &str) -> Result<String, AppError> {
    let label: String = url::form_urlencoded::byte_serialize(format!("{issuer}:{account}").as_bytes())
        .collect::<String>()
        .replace('+', "%20");

    let mut uri = Url::parse(&format!("otpauth://totp/{label}"))
        .map_err(|err| AppError::Internal(format!("invalid otp uri: {err}")))?;
    uri.query_pairs_mut()
        .append_pair("secret", secret)
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", "6")
        .append_pair("period", "30");

    Ok(uri.to_string())
}

#[cfg(test)]
mod tests {
    use super::{generate_secret, provisioning_uri};

    #[test]
    fn secret_is_unpadded_base32_of_160_bits() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
    }

    #[test]
    fn secrets_differ_between_calls() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn uri_carries_issuer_and_secret() {
        let uri = provisioning_uri("MediDispatch", "driver@example.com", "JBSWY3DPEHPK3PXP").unwrap();
        assert!(uri.starts_with("otpauth://totp/MediDispatch%3Adriver%40example.com?"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(uri.contains("issuer=MediDispatch"));
    }
}
