//! Request addressing.
//!
//! A request path names a single cell:
//!
//! ```text
//! /{table}/{family}:{qualifier}/{row...}
//! ```
//!
//! The path is percent-decoded before it is split, so `%2F` in a row key
//! becomes a separator like any other `/`. Only the first two segments are
//! structural. Everything after them is the row key, re-joined with `/` and
//! prefixed with `/`.

use std::str::FromStr;

use axum::http::Method;
use percent_encoding::percent_decode_str;

/// Why a path could not be turned into a [`CellAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Fewer than four `/`-separated segments.
    #[error("Wrong URL")]
    MalformedPath,
    /// The column segment is not exactly `family:qualifier`.
    #[error("Wrong Column")]
    MalformedColumn,
}

/// The cell a request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellAddress {
    pub table: String,
    pub family: String,
    pub qualifier: String,
    pub row: String,
}

impl CellAddress {
    /// Parse a path exactly as it arrived in the request line.
    ///
    /// Escapes that decode to invalid UTF-8 make the path malformed.
    /// Malformed escapes such as `%zz` are kept literally.
    pub fn from_uri_path(raw: &str) -> Result<Self, AddressError> {
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| AddressError::MalformedPath)?;
        decoded.parse()
    }

    /// `family:qualifier`, the column name as the store reports it.
    pub fn column(&self) -> String {
        format!("{}:{}", self.family, self.qualifier)
    }
}

impl FromStr for CellAddress {
    type Err = AddressError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 4 {
            return Err(AddressError::MalformedPath);
        }

        let (family, qualifier) = split_column(segments[2])?;

        Ok(Self {
            table: segments[1].to_string(),
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            row: format!("/{}", segments[3..].join("/")),
        })
    }
}

fn split_column(segment: &str) -> Result<(&str, &str), AddressError> {
    let mut parts = segment.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(family), Some(qualifier), None) if !family.is_empty() && !qualifier.is_empty() => {
            Ok((family, qualifier))
        }
        _ => Err(AddressError::MalformedColumn),
    }
}

/// Parameters of a `?list=true` range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// Exclusive stop key; empty means unbounded.
    pub end: String,
    pub batch: usize,
}

/// The closed set of operations the gateway performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetCell,
    ListRange(ListParams),
    PutCell,
    DeleteCell,
}

impl Operation {
    /// Map an HTTP method and query string to an operation.
    ///
    /// Returns `None` for methods outside GET/PUT/DELETE.
    pub fn resolve(method: &Method, query: Option<&str>, default_batch: usize) -> Option<Self> {
        match *method {
            Method::GET => {
                let query = QueryFlags::parse(query.unwrap_or(""));
                if query.list {
                    Some(Operation::ListRange(ListParams {
                        end: query.end,
                        batch: query.batch.unwrap_or(default_batch),
                    }))
                } else {
                    Some(Operation::GetCell)
                }
            }
            Method::PUT => Some(Operation::PutCell),
            Method::DELETE => Some(Operation::DeleteCell),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetCell => "get",
            Operation::ListRange(_) => "scan",
            Operation::PutCell => "put",
            Operation::DeleteCell => "delete",
        }
    }
}

#[derive(Debug, Default)]
struct QueryFlags {
    list: bool,
    end: String,
    batch: Option<usize>,
}

impl QueryFlags {
    /// First occurrence of each key wins. An unparsable or non-positive
    /// `batch` is ignored rather than rejected.
    fn parse(query: &str) -> Self {
        let mut flags = QueryFlags::default();
        let (mut saw_list, mut saw_end, mut saw_batch) = (false, false, false);

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "list" if !saw_list => {
                    saw_list = true;
                    flags.list = value == "true";
                }
                "end" if !saw_end => {
                    saw_end = true;
                    flags.end = value.into_owned();
                }
                "batch" if !saw_batch => {
                    saw_batch = true;
                    flags.batch = value.parse::<i64>().ok().filter(|b| *b > 0).map(|b| b as usize);
                }
                _ => {}
            }
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> Result<CellAddress, AddressError> {
        path.parse()
    }

    #[test]
    fn parses_basic_address() {
        let addr = parse("/users/cf:name/alice").unwrap();
        assert_eq!(addr.table, "users");
        assert_eq!(addr.family, "cf");
        assert_eq!(addr.qualifier, "name");
        assert_eq!(addr.row, "/alice");
        assert_eq!(addr.column(), "cf:name");
    }

    #[test]
    fn row_keeps_remaining_segments() {
        let addr = parse("/t/cf:q/a/b/c").unwrap();
        assert_eq!(addr.row, "/a/b/c");

        let trailing = parse("/t/cf:q/").unwrap();
        assert_eq!(trailing.row, "/");
    }

    #[test]
    fn short_paths_are_malformed() {
        for path in ["", "/", "/t", "/t/cf:q"] {
            assert_eq!(parse(path), Err(AddressError::MalformedPath), "{path}");
        }
    }

    #[test]
    fn column_needs_exactly_one_colon() {
        for path in ["/t/cf/r", "/t/cf:q:x/r", "/t/:q/r", "/t/cf:/r", "/t/:/r"] {
            assert_eq!(parse(path), Err(AddressError::MalformedColumn), "{path}");
        }
    }

    #[test]
    fn escaped_paths_are_decoded() {
        let addr = CellAddress::from_uri_path("/users/cf:name/a%20b").unwrap();
        assert_eq!(addr.row, "/a b");

        let addr = CellAddress::from_uri_path("/users/cf%3Aname/r").unwrap();
        assert_eq!((addr.family.as_str(), addr.qualifier.as_str()), ("cf", "name"));

        let addr = CellAddress::from_uri_path("/users/cf:q/a%2Fb").unwrap();
        assert_eq!(addr.row, "/a/b");

        assert_eq!(
            CellAddress::from_uri_path("/t%2Fcf:q"),
            Err(AddressError::MalformedPath)
        );
        assert_eq!(
            CellAddress::from_uri_path("/t/cf:q/%FF"),
            Err(AddressError::MalformedPath)
        );
        assert_eq!(CellAddress::from_uri_path("/t/cf:q/%zz").unwrap().row, "/%zz");
    }

    #[test]
    fn get_without_list_is_point_read() {
        assert_eq!(Operation::resolve(&Method::GET, None, 100), Some(Operation::GetCell));
        assert_eq!(
            Operation::resolve(&Method::GET, Some("list=false&batch=3"), 100),
            Some(Operation::GetCell)
        );
    }

    #[test]
    fn list_reads_end_and_batch() {
        let op = Operation::resolve(&Method::GET, Some("list=true&end=row_9&batch=25"), 100);
        assert_eq!(
            op,
            Some(Operation::ListRange(ListParams { end: "row_9".into(), batch: 25 }))
        );
    }

    #[test]
    fn bad_batch_falls_back_to_default() {
        for query in ["list=true&batch=abc", "list=true&batch=0", "list=true&batch=-4", "list=true"] {
            assert_eq!(
                Operation::resolve(&Method::GET, Some(query), 77),
                Some(Operation::ListRange(ListParams { end: String::new(), batch: 77 })),
                "{query}"
            );
        }
    }

    #[test]
    fn first_query_value_wins() {
        let op = Operation::resolve(&Method::GET, Some("list=true&end=a&end=b"), 10);
        assert_eq!(op, Some(Operation::ListRange(ListParams { end: "a".into(), batch: 10 })));
    }

    #[test]
    fn other_methods_are_unsupported() {
        assert_eq!(Operation::resolve(&Method::PUT, None, 1), Some(Operation::PutCell));
        assert_eq!(Operation::resolve(&Method::DELETE, None, 1), Some(Operation::DeleteCell));
        assert_eq!(Operation::resolve(&Method::POST, None, 1), None);
        assert_eq!(Operation::resolve(&Method::HEAD, None, 1), None);
    }
}
