use rand::{rngs::OsRng, RngCore};
use reqwest::Url;

const TOKEN_BYTES: usize = 32;

/// 32 random bytes from the OS generator, hex-encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn generate_api_key() -> String {
    random_token()
}

pub fn generate_reset_token() -> String {
    random_token()
}

/// Initials avatar for accounts registered with a password.
pub fn initials_avatar_url(seed: &str) -> String {
    avatar_url(
        "https://ui-avatars.com/api/",
        &[("background", "random"), ("color", "fff"), ("size", "500")],
        "name",
        seed,
    )
}

/// Illustrated avatar for social accounts whose provider sent no picture.
pub fn dicebear_avatar_url(seed: &str) -> String {
    avatar_url("https://api.dicebear.com/7.x/lorelei/png", &[], "seed", seed)
}

fn avatar_url(base: &str, extra: &[(&str, &str)], seed_param: &str, seed: &str) -> String {
    let seed = match seed.trim() {
        "" => "user",
        s => s,
    };
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair(seed_param, seed)
                .extend_pairs(extra);
            url.to_string()
        }
        Err(_) => base.to_string(),
    }
}
