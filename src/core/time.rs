use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Whole seconds elapsed since `since`, clamped at zero.
pub(crate) fn seconds_since(since: PrimitiveDateTime, now: PrimitiveDateTime) -> i64 {
    let elapsed = now.assume_utc().unix_timestamp() - since.assume_utc().unix_timestamp();
    elapsed.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Time};

    #[test]
    fn format_primitive_outputs_utc_z() {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        let time = Time::from_hms(10, 20, 30).unwrap();
        let value = PrimitiveDateTime::new(date, time);
        assert_eq!(format_primitive(value), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn seconds_since_clamps_negative() {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        let earlier = PrimitiveDateTime::new(date, Time::from_hms(10, 0, 0).unwrap());
        let later = PrimitiveDateTime::new(date, Time::from_hms(10, 1, 30).unwrap());
        assert_eq!(seconds_since(earlier, later), 90);
        assert_eq!(seconds_since(later, earlier), 0);
    }
}
