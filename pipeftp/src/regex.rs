//! # Regex
//!
//! Patterns for the reply lines and for the replies carrying values

use lazy_regex::{Lazy, Regex};

/// Code, separator and text of a reply line. The separator is `-` when the line opens a
/// multiline block, ` ` when it is a final line.
pub static REPLY_LINE_RE: Lazy<Regex> = lazy_regex!(r"^(\d{3})([ -])(.*)$");

/// `h1,h2,h3,h4,p1,p2` anywhere in a 227 reply; some servers omit the parentheses
pub static PASV_PORT_RE: Lazy<Regex> =
    lazy_regex!(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})");

/// Trailing number of a 213 reply to SIZE
pub static SIZE_RE: Lazy<Regex> = lazy_regex!(r"\s+(\d+)\s*$");
