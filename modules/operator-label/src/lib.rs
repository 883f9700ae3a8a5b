//! Derives a coarse "who runs this" label from a server's display name.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

pub const UNKNOWN: &str = "Unknown";

pub trait OperatorLabeler {
    fn label(&self, server_name: &str, ip: &str) -> String;
}

/// Configured patterns first, then a domain found in the name, then a
/// cleaned-up name, then a region hint.
pub struct PatternTable {
    patterns: Vec<(Regex, String)>,
    domain: Regex,
    web_noise: Regex,
    generic: Regex,
    digits: Regex,
    punct: Regex,
    region: Regex,
}

impl PatternTable {
    /// `patterns` are `(regex, label)` pairs, matched case-insensitively in order.
    pub fn new<P, L>(patterns: impl IntoIterator<Item = (P, L)>) -> Result<Self>
    where
        P: AsRef<str>,
        L: Into<String>,
    {
        let mut compiled = Vec::new();
        for (p, label) in patterns {
            let re = RegexBuilder::new(p.as_ref())
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid operator pattern {:?}", p.as_ref()))?;
            compiled.push((re, label.into()));
        }
        Ok(PatternTable {
            patterns: compiled,
            domain: Regex::new(r"(?i)([a-z0-9-]{2,})\.(com|net|org|tk|ru|de|eu|gg|host|cloud|xyz|info)\b")?,
            web_noise: Regex::new(r"https?://\S+|www\.\S+|discord\.gg/\S+|#[a-f0-9-]{10,}|\bqq\d+\b")?,
            generic: Regex::new(concat!(
                r"\b(us|eu|cn|ru|de|au|uk|fr|jp|kr|tw|sg|br|es|th|vn|nl",
                r"|east|west|north|south|central|global|international",
                r"|killing floor 2|kf2|server|official|public|dedicated|private|ranked|unranked",
                r"|whitelist(?:ed)?|password(?:ed)?|by|new|endless|survival|objective|weekly",
                r"|hard|suicidal|hoe\+*|hell on earth|normal|beginner|long|short|medium",
                r"|custom|maps?|vanilla|workshop)\b",
            ))?,
            digits: Regex::new(r"\b\d+\b")?,
            punct: Regex::new(r"[^\w\s]")?,
            region: Regex::new(r"(?i)\b(us|eu|cn|ru|de|au|uk|fr|jp|kr|tw|sg|br|es|th|vn|nl)\b")?,
        })
    }

    fn cleaned(&self, raw: &str) -> String {
        let lower = raw.to_lowercase();
        let s = self.web_noise.replace_all(&lower, " ");
        let s = s.replace(['¦', '｜', '│'], "|");
        let head = s.split('|').next().unwrap_or_default();
        let s = self.generic.replace_all(head, " ");
        let s = self.digits.replace_all(&s, " ");
        let s = self.punct.replace_all(&s, " ");
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl OperatorLabeler for PatternTable {
    fn label(&self, server_name: &str, ip: &str) -> String {
        if server_name.trim().is_empty() {
            return ip.to_string();
        }
        if let Some((_, label)) = self.patterns.iter().find(|(re, _)| re.is_match(server_name)) {
            return label.clone();
        }
        if let Some(caps) = self.domain.captures(server_name) {
            return title_case(&caps[1].to_lowercase());
        }
        let cleaned = self.cleaned(server_name);
        if cleaned.chars().count() >= 2 {
            return title_case(&cleaned);
        }
        match self.region.captures(server_name) {
            Some(caps) => format!("{} [{}]", UNKNOWN, caps[1].to_uppercase()),
            None => UNKNOWN.to_string(),
        }
    }
}

/// Upper-cases every letter that follows a non-letter.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() && !prev_alpha {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PatternTable {
        PatternTable::new([(r"\bcyxc\b", "Cyxc"), (r"猛男妙妙屋", "Mengnan (CN)")]).unwrap()
    }

    #[test]
    fn configured_patterns_win() {
        let t = table();
        assert_eq!(t.label("CYXC | Hard Long #3", "1.1.1.1"), "Cyxc");
        assert_eq!(t.label("猛男妙妙屋 服务器", "1.1.1.1"), "Mengnan (CN)");
    }

    #[test]
    fn domain_rescue() {
        assert_eq!(table().label("Fun Times | play at zedhunters.net", "1.1.1.1"), "Zedhunters");
    }

    #[test]
    fn cleanup_and_fallbacks() {
        let t = table();
        assert_eq!(t.label("[EU] Night-Owls 17 | Hard Long", "1.1.1.1"), "Night Owls");
        assert_eq!(t.label("US 1", "1.1.1.1"), "Unknown [US]");
        assert_eq!(t.label("???", "1.1.1.1"), UNKNOWN);
        assert_eq!(t.label("   ", "9.9.9.9"), "9.9.9.9");
    }

    #[test]
    fn bad_pattern_is_rejected() {
        assert!(PatternTable::new([("(unclosed", "x")]).is_err());
    }

    #[test]
    fn title_case_follows_separators() {
        assert_eq!(title_case("night-owls club"), "Night-Owls Club");
    }
}
