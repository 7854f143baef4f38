//! On-disk naming for containers and the entries inside them.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// `{home}/{YYYY.MM}/{DD}/{HHMMSS.ffffff}.tar`
pub fn container_path(home: &Path, opened_at: NaiveDateTime) -> PathBuf {
    home.join(opened_at.format("%Y.%m").to_string())
        .join(opened_at.format("%d").to_string())
        .join(opened_at.format("%H%M%S.%6f.tar").to_string())
}

/// `{YYYY.MM}/{DD}/{HHMM}/{SS.ffffff}.jpg`, unique per microsecond.
pub fn entry_name(captured_at: NaiveDateTime) -> String {
    captured_at.format("%Y.%m/%d/%H%M/%S.%6f.jpg").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(14, 7, 9, micro)
            .unwrap()
    }

    #[test]
    fn container_path_is_hierarchical() {
        let path = container_path(Path::new("/srv/archive/gate"), at(42));
        assert_eq!(
            path,
            PathBuf::from("/srv/archive/gate/2024.03/05/140709.000042.tar")
        );
    }

    #[test]
    fn entry_name_buckets_by_day_and_minute() {
        assert_eq!(entry_name(at(250_000)), "2024.03/05/1407/09.250000.jpg");
    }

    #[test]
    fn entries_differing_by_one_microsecond_do_not_collide() {
        let first = at(999_998);
        let second = first + Duration::microseconds(1);
        let third = second + Duration::microseconds(1);
        assert_ne!(entry_name(first), entry_name(second));
        assert_ne!(entry_name(second), entry_name(third));
        assert_eq!(entry_name(third), "2024.03/05/1407/10.000000.jpg");
    }
}
