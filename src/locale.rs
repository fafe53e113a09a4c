//! Locale tags and locale matching.
//!
//! Only the subset of BCP 47 the gate needs is understood: a language, an
//! optional script and an optional region. `*` is accepted in any position as
//! a wildcard, which is how model configurations express "any region" (`en-*`)
//! or "any language" (`*-CH`).

/// Wildcard subtag.
pub const ANY_MATCH: &str = "*";

/// Language subtag for an undetermined locale.
pub const UNKNOWN_LANGUAGE: &str = "und";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locale {
    pub language: String,
    pub script: String,
    pub region: String,
}

impl Locale {
    /// Parse a single tag such as `en`, `en-US`, `zh-Hant-TW`, `en-*` or `*-CH`.
    pub fn parse(tag: &str) -> Option<Locale> {
        let re = crate::regex!(
            r"^(?P<language>[A-Za-z]{2,3}|\*)(?:[-_](?P<script>[A-Za-z]{4}))?(?:[-_](?P<region>[A-Za-z]{2}|[0-9]{3}|\*))?$"
        );
        let caps = re.captures(tag.trim())?;
        let part = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or("");

        let language = part("language").to_ascii_lowercase();
        let script = part("script");
        let script = match script.split_at_checked(1) {
            Some((first, rest)) => format!("{}{}", first.to_ascii_uppercase(), rest.to_ascii_lowercase()),
            None => String::new(),
        };
        let region = part("region").to_ascii_uppercase();

        Some(Locale { language, script, region })
    }

    /// True for `und` locales, which carry no language information.
    pub fn is_unknown(&self) -> bool {
        self.language == UNKNOWN_LANGUAGE
    }

    /// Whether `self`, read as a model-supported locale pattern, accepts `locale`.
    ///
    /// Each of language, script and region matches if either side is empty,
    /// the pattern is `*`, or both are equal. All three must match.
    pub fn accepts(&self, locale: &Locale) -> bool {
        subtag_matches(&self.language, &locale.language)
            && subtag_matches(&self.script, &locale.script)
            && subtag_matches(&self.region, &locale.region)
    }
}

fn subtag_matches(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || value.is_empty() || pattern == ANY_MATCH || pattern == value
}

/// Parse a comma-separated list of tags. An empty or blank string yields an
/// empty list; any malformed tag fails the whole list.
pub fn parse_locales(list: &str) -> Option<Vec<Locale>> {
    list.split(',').map(str::trim).filter(|tag| !tag.is_empty()).map(Locale::parse).collect()
}
