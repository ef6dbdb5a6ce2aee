use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Length is counted in UTF-16 code units, the way browsers count form
/// input, so a password accepted by the sign-up form is accepted here.
pub fn is_password_too_short(plain: &str) -> bool {
    plain.encode_utf16().count() < MIN_PASSWORD_LEN
}

/// Hashes `plain` into an Argon2id PHC string.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Checks `plain` against a stored hash. Argon2 PHC strings and bcrypt
/// hashes written by earlier versions of the site are both accepted.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    if is_bcrypt(hash) {
        return bcrypt::verify(plain, hash).map_err(|e| {
            error!(error = %e, "bcrypt verify error");
            anyhow::anyhow!(e.to_string())
        });
    }
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|p| hash.starts_with(p))
}
