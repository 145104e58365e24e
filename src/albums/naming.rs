//! Album folder name cleaning and date-range labels

use crate::config::Granularity;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Leading separators left over from exports ("_Trip", "- 2019 Party")
static LEADING_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s_\-.]+").unwrap());

/// Regional date spellings and their canonical dotted replacement, applied in order
static DATE_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // 2021-05-03, 2021_05_03, 2021 05 03
        (
            Regex::new(r"(^|\D)((?:19|20)\d{2})[-_ ](0[1-9]|1[0-2])[-_ ](0[1-9]|[12]\d|3[01])(\D|$)").unwrap(),
            "${1}${2}.${3}.${4}${5}",
        ),
        // 03-05-2021, 03_05_2021, 03.05.2021
        (
            Regex::new(r"(^|\D)(0[1-9]|[12]\d|3[01])[-_. ](0[1-9]|1[0-2])[-_. ]((?:19|20)\d{2})(\D|$)").unwrap(),
            "${1}${4}.${3}.${2}${5}",
        ),
        // 2021-05, 2021_05
        (
            Regex::new(r"(^|\D)((?:19|20)\d{2})[-_](0[1-9]|1[0-2])(\D|$)").unwrap(),
            "${1}${2}.${3}${4}",
        ),
        // 20210503
        (
            Regex::new(r"(^|\D)((?:19|20)\d{2})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])(\D|$)").unwrap(),
            "${1}${2}.${3}.${4}${5}",
        ),
        // 03052021
        (
            Regex::new(r"(^|\D)(0[1-9]|[12]\d|3[01])(0[1-9]|1[0-2])((?:19|20)\d{2})(\D|$)").unwrap(),
            "${1}${4}.${3}.${2}${5}",
        ),
    ]
});

/// Leading date or date range in canonical form, then the rest of the name
static DATE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:19|20)\d{2}(?:\.\d{2}(?:\.\d{2})?)?(?:\s*-\s*(?:19|20)\d{2}(?:\.\d{2}(?:\.\d{2})?)?)?)(?:[\s_\-]+|$)(.*)$",
    )
    .unwrap()
});

static STARTS_WITH_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}").unwrap());

/// A folder name split into its date prefix and clean remainder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub prefix: Option<String>,
    pub clean: String,
}

impl NameParts {
    /// Whether the remainder already carries its own year
    pub fn clean_starts_with_year(&self) -> bool {
        STARTS_WITH_YEAR.is_match(&self.clean)
    }
}

/// Rewrite regional date spellings into `yyyy.mm.dd` / `yyyy.mm`
pub fn normalize_dates(name: &str) -> String {
    DATE_REWRITES
        .iter()
        .fold(name.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Strip separators, normalize dates and split off a leading date prefix
pub fn split_name(name: &str) -> NameParts {
    let stripped = LEADING_SEPARATORS.replace(name.trim(), "");
    let normalized = normalize_dates(&stripped);

    match DATE_PREFIX.captures(&normalized) {
        Some(caps) => {
            let prefix = caps[1].split('-').map(str::trim).collect::<Vec<_>>().join("-");
            let clean = LEADING_SEPARATORS.replace(caps[2].trim(), "").into_owned();
            NameParts {
                prefix: Some(prefix),
                clean,
            }
        }
        None => NameParts {
            prefix: None,
            clean: normalized.trim().to_string(),
        },
    }
}

/// Collapse a set of dates into a single day, month, year or year range
pub fn range_label(dates: &[DateTime<Utc>], granularity: Granularity) -> Option<String> {
    let first = dates.iter().min()?.date_naive();
    let last = dates.iter().max()?.date_naive();

    let label = if first.year() != last.year() {
        format!("{}-{}", first.year(), last.year())
    } else if granularity == Granularity::Year {
        format!("{}", first.year())
    } else if first == last {
        first.format("%Y.%m.%d").to_string()
    } else if first.month() == last.month() {
        first.format("%Y.%m").to_string()
    } else {
        format!("{}", first.year())
    };

    Some(label)
}

/// `<label> - <clean>`, or whichever half exists
pub fn compose(label: Option<&str>, clean: &str) -> Option<String> {
    match (label, clean.is_empty()) {
        (Some(label), false) => Some(format!("{} - {}", label, clean)),
        (Some(label), true) => Some(label.to_string()),
        (None, false) => Some(clean.to_string()),
        (None, true) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_dates() {
        assert_eq!(normalize_dates("2021_05_yosemite"), "2021.05_yosemite");
        assert_eq!(normalize_dates("2020-01-01_party"), "2020.01.01_party");
        assert_eq!(normalize_dates("trip 20190704"), "trip 2019.07.04");
        assert_eq!(normalize_dates("03-05-2021 wedding"), "2021.05.03 wedding");
        assert_eq!(normalize_dates("bday 25122018"), "bday 2018.12.25");
        // Year ranges and plain numbers are left alone
        assert_eq!(normalize_dates("2019-2021 roadtrips"), "2019-2021 roadtrips");
        assert_eq!(normalize_dates("Trip2021"), "Trip2021");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("2021_05_yosemite"),
            NameParts {
                prefix: Some("2021.05".into()),
                clean: "yosemite".into()
            }
        );
        assert_eq!(
            split_name("_ 2019 - 2021 - Road trips"),
            NameParts {
                prefix: Some("2019-2021".into()),
                clean: "Road trips".into()
            }
        );
        assert_eq!(
            split_name("Summer holidays"),
            NameParts {
                prefix: None,
                clean: "Summer holidays".into()
            }
        );
        assert_eq!(split_name("2018").clean, "");
        assert!(!split_name("Trip2021").clean_starts_with_year());
        assert!(split_name("1000 Islands").clean_starts_with_year());
    }

    #[test]
    fn test_split_is_stable_on_composed_names() {
        let parts = split_name("2021.05 - yosemite");
        assert_eq!(parts.prefix.as_deref(), Some("2021.05"));
        assert_eq!(
            compose(parts.prefix.as_deref(), &parts.clean).unwrap(),
            "2021.05 - yosemite"
        );
    }

    #[test]
    fn test_range_label() {
        let complete = Granularity::Complete;
        assert_eq!(range_label(&[], complete), None);
        assert_eq!(
            range_label(&[day(2021, 5, 3), day(2021, 5, 3)], complete).unwrap(),
            "2021.05.03"
        );
        assert_eq!(
            range_label(&[day(2021, 5, 3), day(2021, 5, 20)], complete).unwrap(),
            "2021.05"
        );
        assert_eq!(
            range_label(&[day(2021, 5, 3), day(2021, 9, 1)], complete).unwrap(),
            "2021"
        );
        assert_eq!(
            range_label(&[day(2021, 5, 3), day(2019, 9, 1)], complete).unwrap(),
            "2019-2021"
        );
        assert_eq!(
            range_label(&[day(2021, 5, 3)], Granularity::Year).unwrap(),
            "2021"
        );
    }

    #[test]
    fn test_compose() {
        assert_eq!(compose(Some("2021"), "Trip").unwrap(), "2021 - Trip");
        assert_eq!(compose(Some("2021"), "").unwrap(), "2021");
        assert_eq!(compose(None, "Trip").unwrap(), "Trip");
        assert_eq!(compose(None, ""), None);
    }
}
