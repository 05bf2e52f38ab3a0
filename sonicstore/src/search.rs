// SPDX-FileCopyrightText: The sonicstore authors
// SPDX-License-Identifier: MPL-2.0

use itertools::Itertools as _;

use crate::repository::SqliteQuery;

/// Orders matches by user engagement in lieu of a relevance score.
///
/// Ties are broken by ID for stable pagination.
pub const RELEVANCE_ORDER: &str = r#""rating" DESC, "starred" DESC, "play_count" DESC, "id""#;

const LIKE_ESCAPE: char = '\\';

/// Default of `SQLITE_MAX_LIKE_PATTERN_LENGTH` in bytes.
///
/// <https://www.sqlite.org/limits.html>
const MAX_LIKE_PATTERN_LEN: usize = 50_000;

/// Free-text query over titles.
///
/// Every term must match at a word boundary of the title, i.e. either
/// at the start or immediately after a space. Matching is case-insensitive
/// for ASCII characters, just like `LIKE` in SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleQuery {
    terms: Vec<String>,
    // Pairs of LIKE patterns (starts with, follows a space) per term.
    patterns: Vec<(String, String)>,
}

impl TitleQuery {
    /// Splits the query string into whitespace separated terms.
    ///
    /// Returns `None` if the query does not contain any terms.
    #[must_use]
    pub fn parse(query: &str) -> Option<Self> {
        let terms = query
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        if terms.is_empty() {
            return None;
        }
        let patterns = terms
            .iter()
            .map(|term| {
                let escaped = escape_like(term);
                (format!("{escaped}%"), format!("% {escaped}%"))
            })
            .collect();
        Some(Self { terms, patterns })
    }

    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Checks if any term is too long to be matched by SQLite.
    ///
    /// Such a query is treated as matching nothing.
    #[must_use]
    pub fn exceeds_pattern_limit(&self) -> bool {
        self.patterns
            .iter()
            .any(|(_, follows_space)| follows_space.len() > MAX_LIKE_PATTERN_LEN)
    }

    /// SQL predicate for a `WHERE` clause.
    ///
    /// References the parameters `?1` to `?2n` for `n` terms, which are
    /// bound by [`TitleQuery::bind_patterns`].
    #[must_use]
    pub(crate) fn filter_sql(&self) -> String {
        (0..self.patterns.len())
            .map(|i| {
                let starts_with = 2 * i + 1;
                let follows_space = starts_with + 1;
                format!(
                    r#"("title" LIKE ?{starts_with} ESCAPE '{LIKE_ESCAPE}' OR "title" LIKE ?{follows_space} ESCAPE '{LIKE_ESCAPE}')"#
                )
            })
            .join(" AND ")
    }

    pub(crate) fn bind_patterns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        self.patterns
            .iter()
            .fold(query, |query, (starts_with, follows_space)| {
                query.bind(starts_with).bind(follows_space)
            })
    }

    /// Evaluates the query against a title in memory.
    ///
    /// Agrees with the SQL predicate.
    #[must_use]
    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_ascii_lowercase();
        self.terms.iter().all(|term| {
            let term = term.to_ascii_lowercase();
            title.starts_with(&term) || title.contains(&format!(" {term}"))
        })
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, LIKE_ESCAPE | '%' | '_') {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::TitleQuery;

    #[test]
    fn empty_query_has_no_terms() {
        assert!(TitleQuery::parse("").is_none());
        assert!(TitleQuery::parse("   ").is_none());
        assert!(TitleQuery::parse(" \t\n").is_none());
    }

    #[test]
    fn split_on_whitespace() {
        let query = TitleQuery::parse("  come\tas  you ").unwrap();
        assert_eq!(query.terms(), ["come", "as", "you"]);
    }

    #[test]
    fn word_boundary() {
        let title = "Come As You Are";
        assert!(TitleQuery::parse("as").unwrap().matches(title));
        assert!(TitleQuery::parse("COME").unwrap().matches(title));
        assert!(TitleQuery::parse("yo").unwrap().matches(title));
        assert!(!TitleQuery::parse("om").unwrap().matches(title));
        assert!(!TitleQuery::parse("s").unwrap().matches(title));
        assert!(!TitleQuery::parse("the").unwrap().matches("Other Side"));
        assert!(TitleQuery::parse("the").unwrap().matches("The Man Who Sold the World"));
    }

    #[test]
    fn all_terms_must_match() {
        let title = "Come As You Are";
        assert!(TitleQuery::parse("as are").unwrap().matches(title));
        assert!(TitleQuery::parse("come are").unwrap().matches(title));
        assert!(!TitleQuery::parse("come zzz").unwrap().matches(title));
    }

    #[test]
    fn filter_sql() {
        let query = TitleQuery::parse("a b").unwrap();
        assert_eq!(
            query.filter_sql(),
            r#"("title" LIKE ?1 ESCAPE '\' OR "title" LIKE ?2 ESCAPE '\') AND ("title" LIKE ?3 ESCAPE '\' OR "title" LIKE ?4 ESCAPE '\')"#
        );
    }

    #[test]
    fn overlong_terms_exceed_pattern_limit() {
        let long_term = "a".repeat(super::MAX_LIKE_PATTERN_LEN);
        assert!(
            TitleQuery::parse(&format!("come {long_term}"))
                .unwrap()
                .exceeds_pattern_limit()
        );
        assert!(
            !TitleQuery::parse(&long_term[10..])
                .unwrap()
                .exceeds_pattern_limit()
        );
    }

    #[test]
    fn escape_like_wildcards() {
        assert_eq!(super::escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(super::escape_like("plain"), "plain");
    }
}
