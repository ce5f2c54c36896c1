use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// 存活检测失败时的进程退出码
pub const LIVENESS_EXIT_CODE: i32 = 1;

/// 最近一次完成同步的时间（Unix 毫秒）
///
/// 调度器写、看门狗读，只共享这一个标量。
#[derive(Debug, Clone)]
pub struct LivenessClock {
    last_success_ms: Arc<AtomicI64>,
}

impl LivenessClock {
    /// 以当前时间初始化，进程启动时有一个完整的存活窗口
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            last_success_ms: Arc::new(AtomicI64::new(at.timestamp_millis())),
        }
    }

    pub fn record(&self, at: DateTime<Utc>) {
        self.last_success_ms
            .store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_success(&self) -> DateTime<Utc> {
        let millis = self.last_success_ms.load(Ordering::Relaxed);
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl Default for LivenessClock {
    fn default() -> Self {
        Self::new()
    }
}

/// 单次检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive { idle: Duration },
    Stalled { idle: Duration },
}

/// 检测到停滞时的报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallReport {
    pub last_success: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub idle: Duration,
    pub window: Duration,
}

/// 看门狗读取当前时间的方式
pub type TimeSource = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 存活看门狗
///
/// 以独立的固定周期检查最近一次同步完成时间，
/// 超过存活窗口即视为调度循环卡死。
pub struct LivenessWatchdog {
    clock: LivenessClock,
    window: Duration,
    tick: Duration,
    now: TimeSource,
}

impl LivenessWatchdog {
    pub fn new(clock: LivenessClock, window: Duration, tick: Duration) -> Self {
        Self {
            clock,
            window,
            tick,
            now: Arc::new(Utc::now),
        }
    }

    /// 替换墙钟，周期检查时用它取当前时间
    pub fn with_time_source(mut self, now: TimeSource) -> Self {
        self.now = now;
        self
    }

    pub fn check(&self, now: DateTime<Utc>) -> Liveness {
        let idle = (now - self.clock.last_success())
            .to_std()
            .unwrap_or(Duration::ZERO);

        if idle > self.window {
            Liveness::Stalled { idle }
        } else {
            Liveness::Alive { idle }
        }
    }

    /// 周期检查，直到检测到停滞才返回
    pub async fn watch(self) -> StallReport {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成
        ticker.tick().await;

        info!(
            window_secs = self.window.as_secs(),
            tick_secs = self.tick.as_secs(),
            "Liveness watchdog started"
        );

        loop {
            ticker.tick().await;

            let now = (self.now)();
            match self.check(now) {
                Liveness::Alive { idle } => {
                    debug!(idle_secs = idle.as_secs(), "Replication loop alive");
                }
                Liveness::Stalled { idle } => {
                    return StallReport {
                        last_success: self.clock.last_success(),
                        detected_at: now,
                        idle,
                        window: self.window,
                    };
                }
            }
        }
    }

    /// 在独立任务中运行，检测到停滞时以非零状态退出进程
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let report = self.watch().await;
            error!(
                last_success = %report.last_success,
                idle_secs = report.idle.as_secs(),
                window_secs = report.window.as_secs(),
                "No replication pass completed within the liveness window, exiting"
            );
            std::process::exit(LIVENESS_EXIT_CODE);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    #[test]
    fn test_clock_record() {
        let clock = LivenessClock::starting_at(DateTime::UNIX_EPOCH);
        let at = Utc::now();
        clock.clone().record(at);

        assert_eq!(
            clock.last_success().timestamp_millis(),
            at.timestamp_millis()
        );
    }

    #[test]
    fn test_check_within_window() {
        let now = Utc::now();
        let clock = LivenessClock::starting_at(now - ChronoDuration::seconds(60));
        let watchdog =
            LivenessWatchdog::new(clock, Duration::from_secs(300), Duration::from_secs(30));

        assert!(matches!(watchdog.check(now), Liveness::Alive { .. }));
    }

    #[test]
    fn test_check_past_window() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock = LivenessClock::starting_at(now - ChronoDuration::seconds(301));
        let watchdog =
            LivenessWatchdog::new(clock, Duration::from_secs(300), Duration::from_secs(30));

        assert_eq!(
            watchdog.check(now),
            Liveness::Stalled {
                idle: Duration::from_secs(301)
            }
        );
    }

    #[test]
    fn test_clock_in_future_is_alive() {
        let now = Utc::now();
        let clock = LivenessClock::starting_at(now + ChronoDuration::seconds(10));
        let watchdog =
            LivenessWatchdog::new(clock, Duration::from_secs(1), Duration::from_secs(1));

        assert_eq!(
            watchdog.check(now),
            Liveness::Alive {
                idle: Duration::ZERO
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_reports_stall_on_first_tick() {
        let clock = LivenessClock::starting_at(Utc::now() - ChronoDuration::minutes(10));
        let watchdog =
            LivenessWatchdog::new(clock, Duration::from_secs(300), Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        let report = watchdog.watch().await;

        assert!(report.idle > Duration::from_secs(300));
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_keeps_running_while_alive() {
        let clock = LivenessClock::new();
        let watchdog =
            LivenessWatchdog::new(clock, Duration::from_secs(300), Duration::from_secs(30));

        let result = tokio::time::timeout(Duration::from_secs(600), watchdog.watch()).await;
        assert!(result.is_err());
    }

    /// 跟随 tokio 暂停时间前进的墙钟
    fn paused_time_source(base: DateTime<Utc>) -> TimeSource {
        let start = tokio::time::Instant::now();
        Arc::new(move || base + ChronoDuration::from_std(start.elapsed()).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_turns_stalled_after_window() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let watchdog = LivenessWatchdog::new(
            LivenessClock::starting_at(base),
            Duration::from_secs(300),
            Duration::from_secs(30),
        )
        .with_time_source(paused_time_source(base));

        let started = tokio::time::Instant::now();
        let report = watchdog.watch().await;

        // 300s 时仍在窗口内，下一次检查才判定停滞
        assert_eq!(started.elapsed(), Duration::from_secs(330));
        assert_eq!(report.idle, Duration::from_secs(330));
        assert_eq!(report.last_success, base);
        assert_eq!(report.detected_at, base + ChronoDuration::seconds(330));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_heartbeat_extends_window() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock = LivenessClock::starting_at(base);
        let watchdog = LivenessWatchdog::new(
            clock.clone(),
            Duration::from_secs(300),
            Duration::from_secs(30),
        )
        .with_time_source(paused_time_source(base));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(120)).await;
            clock.record(base + ChronoDuration::seconds(120));
        });

        let started = tokio::time::Instant::now();
        let report = watchdog.watch().await;

        assert_eq!(started.elapsed(), Duration::from_secs(450));
        assert_eq!(report.last_success, base + ChronoDuration::seconds(120));
        assert_eq!(report.idle, Duration::from_secs(330));
    }
}
