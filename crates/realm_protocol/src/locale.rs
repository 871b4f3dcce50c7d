//! Client locale tags and per-locale values.

use std::fmt;

/// Locale announced by the client during authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    EnUs,
    KoKr,
    FrFr,
    DeDe,
    ZhCn,
    ZhTw,
    EsEs,
    EsMx,
    RuRu,
    PtBr,
    ItIt,
}

impl Locale {
    pub const COUNT: usize = 11;

    pub const ALL: [Locale; Self::COUNT] = [
        Locale::EnUs,
        Locale::KoKr,
        Locale::FrFr,
        Locale::DeDe,
        Locale::ZhCn,
        Locale::ZhTw,
        Locale::EsEs,
        Locale::EsMx,
        Locale::RuRu,
        Locale::PtBr,
        Locale::ItIt,
    ];

    /// Parses a four letter tag such as `"enUS"`. Case sensitive, like the
    /// tags clients send.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|locale| locale.tag() == tag)
    }

    pub fn tag(self) -> &'static str {
        match self {
            Locale::EnUs => "enUS",
            Locale::KoKr => "koKR",
            Locale::FrFr => "frFR",
            Locale::DeDe => "deDE",
            Locale::ZhCn => "zhCN",
            Locale::ZhTw => "zhTW",
            Locale::EsEs => "esES",
            Locale::EsMx => "esMX",
            Locale::RuRu => "ruRU",
            Locale::PtBr => "ptBR",
            Locale::ItIt => "itIT",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A value with optional per-locale overrides, falling back to a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localized<T> {
    default: T,
    overrides: [Option<T>; Locale::COUNT],
}

impl<T> Localized<T> {
    pub fn new(default: T) -> Self {
        Self {
            default,
            overrides: std::array::from_fn(|_| None),
        }
    }

    pub fn with(mut self, locale: Locale, value: T) -> Self {
        self.set(locale, value);
        self
    }

    pub fn set(&mut self, locale: Locale, value: T) {
        self.overrides[locale.index()] = Some(value);
    }

    /// Value for `locale`, or the default when there is no override.
    pub fn get(&self, locale: Locale) -> &T {
        self.overrides[locale.index()]
            .as_ref()
            .unwrap_or(&self.default)
    }
}

impl<T: Default> Default for Localized<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for locale in Locale::ALL {
            assert_eq!(Locale::from_tag(locale.tag()), Some(locale));
        }
        assert_eq!(Locale::from_tag("xxXX"), None);
    }

    #[test]
    fn missing_override_falls_back_to_default() {
        let motd = Localized::new("Welcome".to_string()).with(Locale::DeDe, "Willkommen".to_string());
        assert_eq!(motd.get(Locale::DeDe), "Willkommen");
        assert_eq!(motd.get(Locale::FrFr), "Welcome");
    }
}
