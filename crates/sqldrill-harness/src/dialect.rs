//! MySQL compatibility shim for the SQLite backend.
//!
//! The exercise queries are written for MySQL. To run them unchanged on
//! SQLite the backend needs:
//!
//! - scalar functions SQLite lacks (`IF`, `MONTH`, `TIMESTAMPDIFF`, ...),
//!   registered per connection by [`install`];
//! - a light statement rewrite, [`translate`], that turns MySQL double-quoted
//!   strings into SQLite string literals and quotes the bare unit keyword of
//!   `TIMESTAMPDIFF`;
//! - case-insensitive text columns, which the fixture loader declares with
//!   `COLLATE NOCASE`.

use std::borrow::Cow;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::Connection;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value, ValueRef};

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Interval units accepted by `TIMESTAMPDIFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Microsecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeUnit {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let unit = match raw.trim().to_ascii_uppercase().as_str() {
            "MICROSECOND" => Self::Microsecond,
            "SECOND" => Self::Second,
            "MINUTE" => Self::Minute,
            "HOUR" => Self::Hour,
            "DAY" => Self::Day,
            "WEEK" => Self::Week,
            "MONTH" => Self::Month,
            "QUARTER" => Self::Quarter,
            "YEAR" => Self::Year,
            _ => return None,
        };
        Some(unit)
    }

    /// Whole units from `start` to `end`, truncated toward zero.
    #[must_use]
    pub fn between(self, start: NaiveDateTime, end: NaiveDateTime) -> Option<i64> {
        let delta = end.signed_duration_since(start);
        match self {
            Self::Microsecond => delta.num_microseconds(),
            Self::Second => Some(delta.num_seconds()),
            Self::Minute => Some(delta.num_minutes()),
            Self::Hour => Some(delta.num_hours()),
            Self::Day => Some(delta.num_days()),
            Self::Week => Some(delta.num_weeks()),
            Self::Month => Some(months_between(start, end)),
            Self::Quarter => Some(months_between(start, end) / 3),
            Self::Year => Some(months_between(start, end) / 12),
        }
    }
}

/// Calendar months from `start` to `end`; a month only counts once the
/// day-of-month and time of day have been reached.
fn months_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let mut months = (i64::from(end.year()) - i64::from(start.year())) * 12
        + i64::from(end.month())
        - i64::from(start.month());
    let start_tail = (start.day(), start.time());
    let end_tail = (end.day(), end.time());
    if months > 0 && end_tail < start_tail {
        months -= 1;
    } else if months < 0 && end_tail > start_tail {
        months += 1;
    }
    months
}

/// Parse the datetime text layouts the fixtures use. Date-only values are
/// taken at midnight.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[derive(Debug, Clone, Copy)]
enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    DayOfWeek,
}

impl DatePart {
    fn extract(self, dt: &NaiveDateTime) -> i64 {
        match self {
            Self::Year => i64::from(dt.year()),
            Self::Month => i64::from(dt.month()),
            Self::Day => i64::from(dt.day()),
            Self::Hour => i64::from(dt.hour()),
            Self::DayOfWeek => i64::from(dt.weekday().number_from_sunday()),
        }
    }
}

const DATE_PART_FUNCTIONS: [(&str, DatePart); 6] = [
    ("YEAR", DatePart::Year),
    ("MONTH", DatePart::Month),
    ("DAY", DatePart::Day),
    ("DAYOFMONTH", DatePart::Day),
    ("HOUR", DatePart::Hour),
    ("DAYOFWEEK", DatePart::DayOfWeek),
];

/// Register the MySQL scalar functions on `conn`.
pub fn install(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_scalar_function("IF", 3, flags, mysql_if)?;
    for (name, part) in DATE_PART_FUNCTIONS {
        conn.create_scalar_function(name, 1, flags, move |ctx| {
            Ok(datetime_arg(ctx, 0).map(|dt| part.extract(&dt)))
        })?;
    }
    conn.create_scalar_function("TIMESTAMPDIFF", 3, flags, timestampdiff)?;
    Ok(())
}

fn mysql_if(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    let branch = if truthy(ctx.get_raw(0)) { 1 } else { 2 };
    ctx.get::<Value>(branch)
}

fn truthy(value: ValueRef<'_>) -> bool {
    match value {
        ValueRef::Null => false,
        ValueRef::Integer(i) => i != 0,
        ValueRef::Real(r) => r != 0.0,
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .is_some_and(|f| f != 0.0),
        ValueRef::Blob(b) => !b.is_empty(),
    }
}

fn timestampdiff(ctx: &Context<'_>) -> rusqlite::Result<Option<i64>> {
    let raw_unit = match ctx.get_raw(0) {
        ValueRef::Null => return Ok(None),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        _ => {
            return Err(rusqlite::Error::UserFunctionError(
                "TIMESTAMPDIFF unit must be a keyword".into(),
            ));
        }
    };
    let unit = TimeUnit::parse(&raw_unit).ok_or_else(|| {
        rusqlite::Error::UserFunctionError(format!("unknown TIMESTAMPDIFF unit: {raw_unit}").into())
    })?;
    let (Some(start), Some(end)) = (datetime_arg(ctx, 1), datetime_arg(ctx, 2)) else {
        return Ok(None);
    };
    Ok(unit.between(start, end))
}

fn datetime_arg(ctx: &Context<'_>, idx: usize) -> Option<NaiveDateTime> {
    match ctx.get_raw(idx) {
        ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(parse_datetime),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Statement rewrite
// ---------------------------------------------------------------------------

/// Rewrite MySQL-only syntax into its SQLite equivalent.
///
/// Single-quoted strings, backtick identifiers and comments pass through
/// untouched, except that a MySQL `#` comment becomes `--`. Returns the input
/// unchanged when nothing needed rewriting.
#[must_use]
pub fn translate(sql: &str) -> Cow<'_, str> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '`' => {
                let end = quoted_end(&chars, i, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = line_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '#' => {
                let end = line_end(&chars, i);
                out.push_str("--");
                out.extend(&chars[i + 1..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = block_comment_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '"' => i = rewrite_double_quoted(&chars, i, &mut out),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let end = word_end(&chars, i);
                let word: String = chars[i..end].iter().collect();
                out.push_str(&word);
                i = end;
                if word.eq_ignore_ascii_case("TIMESTAMPDIFF") {
                    i = quote_unit_argument(&chars, i, &mut out);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    if out == sql {
        Cow::Borrowed(sql)
    } else {
        Cow::Owned(out)
    }
}

/// Backtick-quote an identifier. [`translate`] passes these through, so
/// generated statements can go through the same path as case queries.
#[must_use]
pub fn quote_backticks(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn word_end(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while chars
        .get(i)
        .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
    {
        i += 1;
    }
    i
}

fn skip_whitespace(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    i
}

/// End (exclusive) of a quoted run opened at `start`. A doubled quote is an
/// escaped quote.
fn quoted_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Position of the newline ending a line comment, or the end of input.
fn line_end(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |offset| start + offset)
}

/// End (exclusive) of a `/* */` comment. An unterminated comment runs to the
/// end of input.
fn block_comment_end(chars: &[char], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

fn rewrite_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('\'');
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return i,
            Some('"') if chars.get(i + 1) == Some(&'"') => {
                out.push('"');
                i += 2;
            }
            Some('"') => {
                out.push('\'');
                return i + 1;
            }
            Some('\'') => {
                out.push_str("''");
                i += 1;
            }
            Some(&c) => {
                out.push(c);
                i += 1;
            }
        }
    }
}

/// After a `TIMESTAMPDIFF` token: if the first argument is a bare unit
/// keyword, copy up to it and emit it as a string literal.
fn quote_unit_argument(chars: &[char], after_name: usize, out: &mut String) -> usize {
    let open = skip_whitespace(chars, after_name);
    if chars.get(open) != Some(&'(') {
        return after_name;
    }
    let unit_start = skip_whitespace(chars, open + 1);
    let unit_end = word_end(chars, unit_start);
    if unit_end == unit_start {
        return after_name;
    }
    let unit: String = chars[unit_start..unit_end].iter().collect();
    let comma = skip_whitespace(chars, unit_end);
    if chars.get(comma) != Some(&',') || TimeUnit::parse(&unit).is_none() {
        return after_name;
    }
    out.extend(&chars[after_name..unit_start]);
    out.push('\'');
    out.push_str(&unit.to_ascii_uppercase());
    out.push('\'');
    unit_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(text: &str) -> NaiveDateTime {
        parse_datetime(text).unwrap()
    }

    fn scalar(conn: &Connection, sql: &str) -> Value {
        conn.query_row(sql, [], |row| row.get::<_, Value>(0)).unwrap()
    }

    fn shim() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();
        conn
    }

    #[test]
    fn translate_quotes_timestampdiff_unit() {
        let sql = "SELECT AVG(TIMESTAMPDIFF(minute,start_time,end_time)) FROM exam_answers";
        assert_eq!(
            translate(sql),
            "SELECT AVG(TIMESTAMPDIFF('MINUTE',start_time,end_time)) FROM exam_answers"
        );
        let spaced = "timestampdiff ( HOUR , a, b)";
        assert_eq!(translate(spaced), "timestampdiff ( 'HOUR' , a, b)");
    }

    #[test]
    fn translate_leaves_already_quoted_units() {
        let sql = "SELECT TIMESTAMPDIFF('SECOND', a, b)";
        assert!(matches!(translate(sql), Cow::Borrowed(_)));
        let not_a_unit = "SELECT TIMESTAMPDIFF(unit_col, a, b)";
        assert_eq!(translate(not_a_unit), not_a_unit);
    }

    #[test]
    fn translate_double_quoted_strings() {
        assert_eq!(
            translate(r#"WHERE breed_group!="None" AND breed_group!="""#),
            "WHERE breed_group!='None' AND breed_group!=''"
        );
        assert_eq!(translate(r#"SELECT "it's""#), "SELECT 'it''s'");
        assert_eq!(translate(r#"SELECT "say ""hi""""#), r#"SELECT 'say "hi"'"#);
    }

    #[test]
    fn translate_skips_single_quotes_and_backticks() {
        let sql = "SELECT 'TIMESTAMPDIFF(HOUR, \"x\"' AS `a\"b` FROM t";
        assert_eq!(translate(sql), sql);
        let sql = "SELECT mytimestampdiff(HOUR, a, b)";
        assert_eq!(translate(sql), sql);
    }

    #[test]
    fn backtick_identifiers_survive_translate() {
        assert_eq!(quote_backticks("dogs"), "`dogs`");
        assert_eq!(quote_backticks("a`b"), "`a``b`");
        let sql = format!("SELECT COUNT(*) FROM {}", quote_backticks("a`b"));
        assert_eq!(translate(&sql), sql.as_str());
    }

    #[test]
    fn translate_passes_over_comments() {
        let sql = "-- the dog's breed\nSELECT \"breed\" AS n FROM dogs";
        assert_eq!(translate(sql), "-- the dog's breed\nSELECT 'breed' AS n FROM dogs");

        let sql = "SELECT /* it's \"quoted\" */ \"x\" # owner's note\nFROM t";
        assert_eq!(
            translate(sql),
            "SELECT /* it's \"quoted\" */ 'x' -- owner's note\nFROM t"
        );

        let sql = "SELECT a - -1, b-- trailing \"note\"";
        assert_eq!(translate(sql), sql);
        assert_eq!(translate("SELECT 1 /* open"), "SELECT 1 /* open");
    }

    #[test]
    fn time_unit_truncates_toward_zero() {
        let start = dt("2014-01-01 10:00:00");
        assert_eq!(TimeUnit::Minute.between(start, dt("2014-01-01 10:30:59")), Some(30));
        assert_eq!(TimeUnit::Minute.between(start, dt("2014-01-01 09:59:01")), Some(0));
        assert_eq!(TimeUnit::Hour.between(start, dt("2014-01-01 08:30:00")), Some(-1));
        assert_eq!(TimeUnit::Second.between(start, dt("2014-01-01 10:00:01.900")), Some(1));
        assert_eq!(TimeUnit::Day.between(start, dt("2014-01-08")), Some(6));
        assert_eq!(TimeUnit::Week.between(start, dt("2014-01-15 10:00:00")), Some(2));
    }

    #[test]
    fn calendar_units() {
        let start = dt("2014-01-31 12:00:00");
        assert_eq!(TimeUnit::Month.between(start, dt("2014-02-28 12:00:00")), Some(0));
        assert_eq!(TimeUnit::Month.between(start, dt("2014-03-31 12:00:00")), Some(2));
        assert_eq!(TimeUnit::Month.between(dt("2014-03-31"), dt("2014-01-31")), Some(-2));
        assert_eq!(TimeUnit::Quarter.between(start, dt("2014-07-31 12:00:00")), Some(2));
        assert_eq!(TimeUnit::Year.between(start, dt("2015-01-31 11:59:59")), Some(0));
        assert_eq!(TimeUnit::Year.between(start, dt("2016-02-01")), Some(2));
    }

    #[test]
    fn parse_datetime_layouts() {
        assert!(parse_datetime("2013-10-01 21:33:12").is_some());
        assert!(parse_datetime("2013-10-01T21:33:12").is_some());
        assert_eq!(parse_datetime("2013-10-01"), parse_datetime("2013-10-01 00:00:00"));
        assert!(parse_datetime("not a date").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn registered_functions() {
        let conn = shim();
        assert_eq!(
            scalar(&conn, "SELECT TIMESTAMPDIFF('MINUTE', '2014-01-01 10:00:00', '2014-01-01 10:45:10')"),
            Value::Integer(45)
        );
        assert_eq!(scalar(&conn, "SELECT TIMESTAMPDIFF('HOUR', NULL, '2014-01-01')"), Value::Null);
        assert_eq!(scalar(&conn, "SELECT TIMESTAMPDIFF('DAY', 'garbage', '2014-01-01')"), Value::Null);
        assert_eq!(scalar(&conn, "SELECT MONTH('2013-11-05 10:00:00')"), Value::Integer(11));
        assert_eq!(scalar(&conn, "SELECT YEAR('2013-11-05')"), Value::Integer(2013));
        assert_eq!(scalar(&conn, "SELECT DAYOFMONTH('2013-11-05')"), Value::Integer(5));
        assert_eq!(scalar(&conn, "SELECT HOUR('2013-11-05 17:10:00')"), Value::Integer(17));
        // 2013-11-03 was a Sunday.
        assert_eq!(scalar(&conn, "SELECT DAYOFWEEK('2013-11-03')"), Value::Integer(1));
        assert_eq!(scalar(&conn, "SELECT MONTH(NULL)"), Value::Null);
    }

    #[test]
    fn mysql_if_truthiness() {
        let conn = shim();
        assert_eq!(scalar(&conn, "SELECT IF(1 = 1, 'yes', 'no')"), Value::Text("yes".into()));
        assert_eq!(scalar(&conn, "SELECT IF(NULL, 'yes', 'no')"), Value::Text("no".into()));
        assert_eq!(scalar(&conn, "SELECT IF('0', 'yes', 'no')"), Value::Text("no".into()));
        assert_eq!(scalar(&conn, "SELECT IF('abc', 1, 2)"), Value::Integer(2));
        assert_eq!(scalar(&conn, "SELECT IF(0.5, 1, NULL)"), Value::Integer(1));
    }

    #[test]
    fn unknown_unit_is_an_error() {
        let conn = shim();
        let err = conn
            .query_row("SELECT TIMESTAMPDIFF('FORTNIGHT', '2014-01-01', '2014-02-01')", [], |r| {
                r.get::<_, Value>(0)
            })
            .unwrap_err();
        assert!(err.to_string().contains("FORTNIGHT"));
    }
}
