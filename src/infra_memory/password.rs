use crate::domain_port::IdentityError;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

pub(super) fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| IdentityError::Unavailable(e.to_string()))?
        .to_string();
    Ok(hash)
}

pub(super) fn verify_password(password: &str, password_hash: &str) -> Result<bool, IdentityError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| IdentityError::Unavailable(format!("invalid PHC hash: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(IdentityError::Unavailable(format!("verify error: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original() {
        let hash = hash_password("ValidPass123").unwrap();
        assert!(verify_password("ValidPass123", &hash).unwrap());
        assert!(!verify_password("ValidPass124", &hash).unwrap());
    }
}
