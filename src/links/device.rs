use lazy_static::lazy_static;
use regex::Regex;

use super::client::Destinos;

lazy_static! {
    static ref ANDROID_RE: Regex = Regex::new(r"(?i)android").unwrap();
    static ref IOS_RE: Regex = Regex::new(r"(?i)(iphone|ipad|ipod)").unwrap();
    static ref MACINTOSH_RE: Regex = Regex::new(r"(?i)macintosh").unwrap();
    static ref MOBILE_RE: Regex = Regex::new(r"(?i)mobile").unwrap();
    static ref MAC_OS_RE: Regex = Regex::new(r"(?i)mac os x").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Android,
    Ios,
    MacOs,
    Desktop,
}

impl DeviceType {
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let Some(ua) = user_agent else {
            return Self::Desktop;
        };
        if ANDROID_RE.is_match(ua) {
            return Self::Android;
        }
        // iPadOS may announce itself as "Macintosh ... Mobile"
        if IOS_RE.is_match(ua) || (MACINTOSH_RE.is_match(ua) && MOBILE_RE.is_match(ua)) {
            return Self::Ios;
        }
        if MAC_OS_RE.is_match(ua) || MACINTOSH_RE.is_match(ua) {
            return Self::MacOs;
        }
        Self::Desktop
    }

    /// Destination for this device, falling back to the default one.
    pub fn pick<'a>(&self, destinos: &'a Destinos) -> &'a str {
        let specific = match self {
            Self::Android => destinos.android.as_deref(),
            Self::Ios => destinos.ios.as_deref(),
            Self::MacOs | Self::Desktop => None,
        };
        specific
            .filter(|s| !s.is_empty())
            .unwrap_or(&destinos.padrao)
    }
}
