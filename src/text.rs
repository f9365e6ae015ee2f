use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::Html;
use std::cmp::Ordering;

/// Vietnamese and common Latin accented letters, grouped by the ASCII letter
/// they fold to.
const FOLDS: &[(char, &str)] = &[
    ('a', "àáạảãâầấậẩẫăằắặẳẵäå"),
    ('e', "èéẹẻẽêềếệểễë"),
    ('i', "ìíịỉĩîï"),
    ('o', "òóọỏõôồốộổỗơờớợởỡö"),
    ('u', "ùúụủũưừứựửữûü"),
    ('y', "ỳýỵỷỹÿ"),
    ('d', "đ"),
    ('c', "ç"),
    ('n', "ñ"),
];

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Plain text of an HTML fragment (user intros, post bodies).
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

fn fold_char(c: char) -> char {
    for (base, variants) in FOLDS {
        if variants.contains(c) {
            return *base;
        }
    }
    c
}

/// Lowercase with diacritics removed.
pub fn fold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).map(fold_char).collect()
}

/// Locale-aware name comparison: accent-insensitive first, then by the
/// lowercase form so that "Ánh" and "Anh" still order deterministically.
pub fn collate(a: &str, b: &str) -> Ordering {
    fold(a)
        .cmp(&fold(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
}

pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in fold(title).chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug
}

/// Parses the timestamp shapes the backend emits: RFC 3339, MySQL
/// `YYYY-MM-DD HH:MM:SS`, datetime-local input and bare dates.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    parse_date(value).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// `YYYY-MM-DD` or `dd/mm/yyyy`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .ok()
}

/// `dd/mm/yyyy` for table cells; unparseable input is shown verbatim.
pub fn format_date_display(value: &str) -> String {
    if value.trim().is_empty() {
        return String::new();
    }
    match parse_timestamp(value) {
        Some(dt) => dt.format("%d/%m/%Y").to_string(),
        None => value.to_string(),
    }
}

pub fn to_date_input(value: &str) -> String {
    parse_timestamp(value)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub fn to_datetime_input(value: &str) -> String {
    parse_timestamp(value)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_default()
}

/// The format the backend stores timestamps in.
pub fn to_mysql_datetime(value: &str) -> Option<String> {
    parse_timestamp(value).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

pub fn format_salary(min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{} - {}", min, max),
        (Some(min), None) => format!("{}+", min),
        (None, Some(max)) => format!("up to {}", max),
        (None, None) => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("Hồ Chí Minh", 20), "Hồ Chí Minh");
        assert_eq!(truncate("Thành phố Hồ Chí Minh", 10), "Thành p...");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(strip_html("plain"), "plain");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn test_slugify_folds_vietnamese() {
        assert_eq!(slugify("Hướng dẫn viết CV"), "huong-dan-viet-cv");
        assert_eq!(slugify("  Đà Nẵng -- 2024!  "), "da-nang-2024");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_collate_ignores_accents() {
        assert_eq!(collate("Ánh Dương", "Bình Minh"), Ordering::Less);
        assert_eq!(collate("zeta", "Alpha"), Ordering::Greater);
        assert_eq!(collate("Đông Á", "Dong A"), Ordering::Greater);
    }

    #[test]
    fn test_date_conversions() {
        assert_eq!(format_date_display("2024-03-05T10:00:00.000Z"), "05/03/2024");
        assert_eq!(format_date_display("2024-03-05"), "05/03/2024");
        assert_eq!(format_date_display("not a date"), "not a date");
        assert_eq!(to_date_input("05/03/2024"), "2024-03-05");
        assert_eq!(to_datetime_input("2024-03-05 08:30:00"), "2024-03-05T08:30");
        assert_eq!(to_mysql_datetime("2024-03-05T08:30").as_deref(), Some("2024-03-05 08:30:00"));
        assert_eq!(to_mysql_datetime(""), None);
    }

    #[test]
    fn test_format_salary() {
        assert_eq!(format_salary(Some(10), Some(20)), "10 - 20");
        assert_eq!(format_salary(Some(10), None), "10+");
        assert_eq!(format_salary(None, Some(20)), "up to 20");
        assert_eq!(format_salary(None, None), "-");
    }
}
