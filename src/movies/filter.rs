//! Composition of the `/movies` tag and free-text filters.
//!
//! A [`MovieFilter`] is built from the raw query string once and can then either be
//! rendered into SQL for PostgreSQL or evaluated against an in-memory movie.

use sqlx::{Postgres, QueryBuilder};

use crate::config::parse_id_list;
use crate::movies::{
    dto::MoviesQuery,
    repo_types::{Movie, Tag},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    /// Movie must carry at least one of these tag ids.
    Ids(Vec<i32>),
    /// Legacy single-tag filter by exact name.
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieFilter {
    pub tags: Option<TagFilter>,
    /// Lowercased search needle.
    pub search: Option<String>,
}

impl MovieFilter {
    pub fn from_query(query: &MoviesQuery) -> Self {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        // a present `tags` list wins over `tag`, even when none of its ids parse
        let tags = match (non_empty(&query.tags), non_empty(&query.tag)) {
            (Some(raw), _) => {
                let ids = parse_id_list(&raw);
                (!ids.is_empty()).then_some(TagFilter::Ids(ids))
            }
            (None, Some(name)) => Some(TagFilter::Name(name)),
            (None, None) => None,
        };

        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        Self { tags, search }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.search.is_none()
    }

    /// Appends a `WHERE` clause over a query that aliases `movies` as `m`.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");

        match &self.tags {
            Some(TagFilter::Ids(ids)) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM movie_tags mt \
                     WHERE mt.movie_id = m.id AND mt.tag_id = ANY(",
                )
                .push_bind(ids.clone())
                .push("))");
            }
            Some(TagFilter::Name(name)) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM movie_tags mt JOIN tags t ON t.id = mt.tag_id \
                     WHERE mt.movie_id = m.id AND t.name = ",
                )
                .push_bind(name.clone())
                .push(")");
            }
            None => {}
        }

        if let Some(needle) = &self.search {
            let pattern = like_pattern(needle);
            qb.push(" AND (LOWER(m.title) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(COALESCE(m.description, '')) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
    }

    /// In-memory counterpart of [`MovieFilter::push_conditions`].
    pub fn matches(&self, movie: &Movie, tags: &[Tag]) -> bool {
        let tag_ok = match &self.tags {
            None => true,
            Some(TagFilter::Ids(ids)) => tags.iter().any(|t| ids.contains(&t.id)),
            Some(TagFilter::Name(name)) => tags.iter().any(|t| &t.name == name),
        };
        let search_ok = match &self.search {
            None => true,
            Some(needle) => {
                movie.title.to_lowercase().contains(needle.as_str())
                    || movie
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(needle.as_str()))
            }
        };
        tag_ok && search_ok
    }
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn query(tag: Option<&str>, tags: Option<&str>, search: Option<&str>) -> MoviesQuery {
        MoviesQuery {
            tag: tag.map(String::from),
            tags: tags.map(String::from),
            search: search.map(String::from),
        }
    }

    fn movie(title: &str, description: Option<&str>) -> Movie {
        Movie {
            id: 1,
            title: title.into(),
            description: description.map(String::from),
            video_url: "https://cdn.example/v.mp4".into(),
            thumbnail_url: None,
            category: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn tag(id: i32, name: &str) -> Tag {
        Tag { id, name: name.into() }
    }

    #[test]
    fn tag_ids_take_precedence_over_tag_name() {
        let f = MovieFilter::from_query(&query(Some("Action"), Some("1, 2"), None));
        assert_eq!(f.tags, Some(TagFilter::Ids(vec![1, 2])));
    }

    #[test]
    fn unparseable_tag_ids_mean_no_tag_filter() {
        let f = MovieFilter::from_query(&query(Some("Action"), Some("x,,y"), None));
        assert_eq!(f.tags, None);
        assert!(f.is_empty());
    }

    #[test]
    fn tag_ids_keep_their_leading_digits() {
        let f = MovieFilter::from_query(&query(None, Some("1abc, 2.5"), None));
        assert_eq!(f.tags, Some(TagFilter::Ids(vec![1, 2])));
    }

    #[test]
    fn empty_tags_param_falls_back_to_tag_name() {
        let f = MovieFilter::from_query(&query(Some("Drama"), Some(""), None));
        assert_eq!(f.tags, Some(TagFilter::Name("Drama".into())));
    }

    #[test]
    fn blank_search_is_ignored_and_search_is_lowercased() {
        assert_eq!(MovieFilter::from_query(&query(None, None, Some("  "))).search, None);
        assert_eq!(
            MovieFilter::from_query(&query(None, None, Some(" Star WARS "))).search.as_deref(),
            Some("star wars")
        );
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn sql_without_filters_is_unconditional() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT m.id FROM movies m");
        MovieFilter::default().push_conditions(&mut qb);
        assert_eq!(qb.sql(), "SELECT m.id FROM movies m WHERE TRUE");
    }

    #[test]
    fn sql_combines_tag_ids_and_search_with_and() {
        let f = MovieFilter::from_query(&query(None, Some("1,2"), Some("Love")));
        let mut qb = QueryBuilder::<Postgres>::new("SELECT m.id FROM movies m");
        f.push_conditions(&mut qb);
        let sql = qb.sql();
        assert!(sql.contains("mt.tag_id = ANY($1)"), "{sql}");
        assert!(sql.contains("AND (LOWER(m.title) LIKE $2"), "{sql}");
        assert!(sql.contains("LOWER(COALESCE(m.description, '')) LIKE $3"), "{sql}");
    }

    #[test]
    fn sql_for_tag_name_joins_tags() {
        let f = MovieFilter::from_query(&query(Some("Action"), None, None));
        let mut qb = QueryBuilder::<Postgres>::new("SELECT m.id FROM movies m");
        f.push_conditions(&mut qb);
        assert!(qb.sql().contains("JOIN tags t ON t.id = mt.tag_id"));
        assert!(qb.sql().contains("t.name = $1"));
    }

    #[test]
    fn any_listed_tag_is_enough() {
        let f = MovieFilter::from_query(&query(None, Some("1,2"), None));
        let m = movie("Heat", None);
        assert!(f.matches(&m, &[tag(2, "Crime")]));
        assert!(f.matches(&m, &[tag(1, "Action"), tag(9, "Noir")]));
        assert!(!f.matches(&m, &[tag(3, "Comedy")]));
        assert!(!f.matches(&m, &[]));
    }

    #[test]
    fn search_matches_title_or_description_case_insensitively() {
        let f = MovieFilter::from_query(&query(None, None, Some("OCEAN")));
        assert!(f.matches(&movie("Ocean's Eleven", None), &[]));
        assert!(f.matches(&movie("Moana", Some("A voyage across the ocean")), &[]));
        assert!(!f.matches(&movie("Heat", Some("LA crime")), &[]));
    }

    #[test]
    fn tag_and_search_must_both_hold() {
        let f = MovieFilter::from_query(&query(Some("Action"), None, Some("heat")));
        assert!(f.matches(&movie("Heat", None), &[tag(1, "Action")]));
        assert!(!f.matches(&movie("Heat", None), &[tag(2, "Drama")]));
        assert!(!f.matches(&movie("Alien", None), &[tag(1, "Action")]));
    }
}
