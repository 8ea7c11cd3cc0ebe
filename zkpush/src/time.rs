pub trait TimeSource {
    // Return an ISO timestamp
    fn current_time(&self) -> String;

    // Milliseconds since the unix epoch
    fn current_millis(&self) -> i128;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> String {
        let time = time::OffsetDateTime::now_utc();

        time.format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| time.unix_timestamp().to_string())
    }

    fn current_millis(&self) -> i128 {
        time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    #[test]
    fn system_time_is_rfc3339() {
        let now = SystemTime {}.current_time();
        assert!(OffsetDateTime::parse(&now, &Rfc3339).is_ok(), "{now}");
    }

    #[test]
    fn millis_are_after_2024() {
        assert!(SystemTime {}.current_millis() > 1_704_067_200_000);
    }
}
