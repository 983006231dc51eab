use super::AuthError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn check_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(MIN_PASSWORD_LEN));
    }
    Ok(())
}

/// Argon2id with a fresh random salt; output is the PHC string.
pub fn hash(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash cannot be parsed.
pub fn verify(password: &str, stored: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored).map_err(|e| AuthError::Hash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hash(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let h = hash("hunter22").unwrap();
        assert!(h.starts_with("$argon2id$"));
        assert!(verify("hunter22", &h).unwrap());
        assert!(!verify("hunter23", &h).unwrap());
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash("same-password").unwrap(), hash("same-password").unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(matches!(verify("x", "not-a-phc-string"), Err(AuthError::Hash(_))));
    }

    #[test]
    fn minimum_length() {
        assert!(matches!(check_strength("12345"), Err(AuthError::WeakPassword(6))));
        assert!(check_strength("123456").is_ok());
    }
}
