use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use crate::error::{AppError, FieldErrors};

/// hash_password
///
/// Hashes a plaintext password with Argon2id and a random salt. The result is a PHC
/// string that embeds the parameters and salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

/// verify_password
///
/// `Ok(false)` on mismatch; `Err` only when the stored hash itself is unreadable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("invalid password hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::internal(format!(
            "password verification failed: {e}"
        ))),
    }
}

/// PasswordPolicy
///
/// Strength rules applied on registration and admin user creation: minimum length, not
/// purely numeric, not close to the username or email, and a zxcvbn score of at least
/// "safely unguessable".
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    min_length: usize,
}

impl PasswordPolicy {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Collects every violation under the `password` key.
    pub fn check(&self, password: &str, username: &str, email: &str) -> FieldErrors {
        let mut errors = FieldErrors::new();

        if password.chars().count() < self.min_length {
            errors.add(
                "password",
                format!(
                    "This password is too short. It must contain at least {} characters.",
                    self.min_length
                ),
            );
        }

        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            errors.add("password", "This password is entirely numeric.");
        }

        let lowered = password.to_lowercase();
        let email_local = email.split('@').next().unwrap_or_default().to_lowercase();
        let similar = [username.to_lowercase(), email_local]
            .iter()
            .any(|attr| attr.len() >= 3 && (lowered.contains(attr.as_str()) || attr.contains(&lowered)));
        if similar {
            errors.add("password", "The password is too similar to the username or email.");
        }

        if errors.is_empty() {
            let estimate = zxcvbn::zxcvbn(password, &[username, email]);
            if estimate.score() < zxcvbn::Score::Three {
                errors.add("password", "This password is too common or easy to guess.");
            }
        }

        errors
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip_and_mismatch() {
        let hash = hash_password("Lantern-Orchid-42!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Lantern-Orchid-42!", &hash).unwrap());
        assert!(!verify_password("lantern-orchid-42!", &hash).unwrap());
    }

    #[test]
    fn garbage_hash_is_an_internal_error() {
        assert!(matches!(
            verify_password("whatever", "not-a-phc-string"),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn policy_rejects_short_numeric_and_similar_passwords() {
        let policy = PasswordPolicy::default();

        assert!(policy.check("1234", "john_doe", "john@example.com").contains("password"));
        assert!(
            policy
                .check("12345678901", "john_doe", "john@example.com")
                .messages("password")
                .iter()
                .any(|m| m.contains("numeric"))
        );
        assert!(
            !policy
                .check("john_doe_2024", "john_doe", "john@example.com")
                .is_empty()
        );
        assert!(!policy.check("password", "alice", "alice@example.com").is_empty());
    }

    #[test]
    fn policy_accepts_a_strong_passphrase() {
        let policy = PasswordPolicy::default();
        assert!(
            policy
                .check("Tangerine-Harbor-Violin-93", "john_doe", "john@example.com")
                .is_empty()
        );
    }
}
