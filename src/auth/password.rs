use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hashes a one-time code before it is stored.
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
}

pub fn verify_secret(secret: &str, hashed: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hashed) else {
        return false;
    };

    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_original_code() {
        let hashed = hash_secret("482913").unwrap();
        assert!(verify_secret("482913", &hashed));
        assert!(!verify_secret("482914", &hashed));
        assert!(!verify_secret("482913", "not-a-hash"));
    }
}
