#[cfg(test)]
mod cron_utils_tests {
    use collector_dispatcher::cron_utils::*;

    use chrono::{Duration, TimeZone, Timelike, Utc};

    #[test]
    fn test_cron_scheduler_creation() {
        let scheduler = CronScheduler::new("0 0 0 * * *");
        assert!(scheduler.is_ok());
        let scheduler = CronScheduler::new("invalid");
        assert!(scheduler.is_err());
    }

    #[test]
    fn test_should_trigger() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();

        let base_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next_minute_plus = Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 30).unwrap();
        assert!(scheduler.should_trigger(Some(base_time), next_minute_plus, Duration::hours(1)));
        let same_minute = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 30).unwrap();
        assert!(!scheduler.should_trigger(Some(base_time), same_minute, Duration::hours(1)));
    }

    #[test]
    fn test_should_trigger_first_run_uses_lookback() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();

        // 整点过去40分钟
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 40, 0).unwrap();
        assert!(scheduler.should_trigger(None, now, Duration::hours(1)));
        assert!(!scheduler.should_trigger(None, now, Duration::minutes(30)));
    }

    #[test]
    fn test_should_trigger_on_exact_boundary() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();

        let last = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert!(scheduler.should_trigger(Some(last), now, Duration::hours(1)));
        // 已在当前触发点执行过
        assert!(!scheduler.should_trigger(Some(now), now, Duration::hours(1)));
    }

    #[test]
    fn test_next_execution_time() {
        let scheduler = CronScheduler::new("0 0 0 * * *").unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = scheduler.next_execution_time(now);

        assert!(next.is_some());
        let next_time = next.unwrap();
        assert_eq!(next_time, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(next_time.hour(), 0);
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(CronScheduler::validate_cron_expression("0 0 0 * * *").is_ok());
        assert!(CronScheduler::validate_cron_expression("0 */5 * * * *").is_ok());
        assert!(CronScheduler::validate_cron_expression("0 0 9-17 * * 1-5").is_ok());
        assert!(CronScheduler::validate_cron_expression("invalid").is_err());
        assert!(CronScheduler::validate_cron_expression("0 0 0 32 * *").is_err());
        assert!(CronScheduler::validate_cron_expression("").is_err());
    }

    #[test]
    fn test_upcoming_times() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let upcoming = scheduler.upcoming_times(now, 3);

        assert_eq!(upcoming.len(), 3);
        assert_eq!(upcoming[0].hour(), 13);
        assert_eq!(upcoming[1].hour(), 14);
        assert_eq!(upcoming[2].hour(), 15);
    }

    #[tokio::test]
    async fn test_cron_cache_parses_once() {
        let cache = CronCache::new();
        assert!(cache.is_empty().await);

        let first = cache.get("0 0 * * * *").await.unwrap();
        let second = cache.get("0 0 * * * *").await.unwrap();
        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().await, 1);

        assert!(cache.get("not a cron").await.is_err());
        assert_eq!(cache.len().await, 1);
    }
}
