//! Keyword matching on spreadsheet headers.
//!
//! Reports come from different exporters in English and Chinese, so columns
//! are recognized by case-folded substring rather than by exact name.

use unicode_casefold::UnicodeCaseFold;

/// What a header is recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderRole {
    Link,
    Date,
    Ctr,
    Revenue,
}

impl HeaderRole {
    #[must_use]
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Link => &["链接", "url", "link"],
            Self::Date => &["日期", "date"],
            Self::Ctr => &["ctr", "点击率"],
            Self::Revenue => &["收入", "revenue", "收益"],
        }
    }

    #[must_use]
    pub fn matches(self, header: &str) -> bool {
        header_matches(header, self.keywords())
    }
}

#[must_use]
pub fn fold_case(text: &str) -> String {
    text.chars().case_fold().collect()
}

/// True when the folded header contains any of the (already folded) keywords.
#[must_use]
pub fn header_matches(header: &str, keywords: &[&str]) -> bool {
    let folded = fold_case(header);
    keywords.iter().any(|keyword| folded.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::{HeaderRole, fold_case};

    #[test]
    fn roles_match_case_insensitively() {
        assert!(HeaderRole::Link.matches("Landing URL"));
        assert!(HeaderRole::Link.matches("推广链接"));
        assert!(HeaderRole::Date.matches("Report Date"));
        assert!(HeaderRole::Ctr.matches("CTR (%)"));
        assert!(HeaderRole::Ctr.matches("点击率"));
        assert!(HeaderRole::Revenue.matches("预估收益"));
        assert!(!HeaderRole::Revenue.matches("clicks"));
    }

    #[test]
    fn folding_handles_non_ascii() {
        assert_eq!(fold_case("ÉTÉ"), "été");
        assert_eq!(fold_case("Straße"), "strasse");
    }
}
