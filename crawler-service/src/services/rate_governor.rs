//! Dual-layer token-bucket admission for outbound provider requests.
//!
//! Every service has a project-wide bucket (shared across users) and a
//! per-user bucket; a request proceeds only when both admit it. Buckets are
//! lock-free `governor` limiters; the per-user layer is keyed through a
//! DashMap state store.

use crate::config::MicrosoftRateLimit;
use crate::models::Service;
use governor::{
    clock::DefaultClock,
    state::{keyed::DashMapStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use service_core::error::AppError;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type ProjectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
type UserLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// Requests-per-second and burst for one bucket layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimits {
    pub rate: u32,
    pub burst: u32,
}

/// Per-service limits for both layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    pub user: BucketLimits,
    pub project: BucketLimits,
}

impl ServiceLimits {
    /// Documented defaults per provider quota sheet. Google Drive here
    /// covers both the Docs and Slides document fetches routed through it.
    pub fn defaults_for(service: Service) -> Option<Self> {
        match service {
            Service::GoogleDrive => Some(Self {
                user: BucketLimits {
                    rate: 100,
                    burst: 200,
                },
                project: BucketLimits {
                    rate: 200,
                    burst: 400,
                },
            }),
            Service::GoogleGmail => Some(Self {
                user: BucketLimits {
                    rate: 250,
                    burst: 500,
                },
                project: BucketLimits {
                    rate: 20_000,
                    burst: 25_000,
                },
            }),
            Service::Notion => Some(Self {
                user: BucketLimits { rate: 3, burst: 3 },
                project: BucketLimits { rate: 3, burst: 3 },
            }),
            // Supplied by configuration.
            Service::MicrosoftDrive => None,
        }
    }

    /// Conservative fallback for services without an explicit entry.
    pub fn conservative() -> Self {
        Self {
            user: BucketLimits { rate: 2, burst: 2 },
            project: BucketLimits { rate: 20, burst: 20 },
        }
    }

    /// Limits for the Google Docs document-fetch path.
    pub fn google_docs() -> Self {
        Self {
            user: BucketLimits {
                rate: 50,
                burst: 100,
            },
            project: BucketLimits {
                rate: 50,
                burst: 100,
            },
        }
    }

    /// Limits for the Google Slides presentation-fetch path.
    pub fn google_slides() -> Self {
        Self {
            user: BucketLimits {
                rate: 10,
                burst: 20,
            },
            project: BucketLimits {
                rate: 50,
                burst: 100,
            },
        }
    }
}

/// The distinct admission classes the governor tracks. Docs and Slides
/// fetches share Drive's OAuth client but carry their own provider quotas,
/// so they get their own buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GovernedApi {
    Drive,
    Docs,
    Slides,
    Gmail,
    MicrosoftDrive,
    Notion,
}

impl GovernedApi {
    pub fn for_service(service: Service) -> Self {
        match service {
            Service::GoogleDrive => GovernedApi::Drive,
            Service::GoogleGmail => GovernedApi::Gmail,
            Service::MicrosoftDrive => GovernedApi::MicrosoftDrive,
            Service::Notion => GovernedApi::Notion,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            GovernedApi::Drive => "drive",
            GovernedApi::Docs => "docs",
            GovernedApi::Slides => "slides",
            GovernedApi::Gmail => "gmail",
            GovernedApi::MicrosoftDrive => "microsoft_drive",
            GovernedApi::Notion => "notion",
        }
    }
}

struct ServiceBuckets {
    project: ProjectLimiter,
    per_user: UserLimiter,
    user_quota: Quota,
}

impl ServiceBuckets {
    fn new(limits: ServiceLimits) -> Self {
        Self {
            project: RateLimiter::direct(quota(limits.project)),
            per_user: RateLimiter::dashmap(quota(limits.user)),
            user_quota: quota(limits.user),
        }
    }
}

fn quota(limits: BucketLimits) -> Quota {
    let rate = NonZeroU32::new(limits.rate.max(1)).expect("rate is clamped to >= 1");
    let burst = NonZeroU32::new(limits.burst.max(1)).expect("burst is clamped to >= 1");
    Quota::per_second(rate).allow_burst(burst)
}

/// Admission governor over all provider APIs.
pub struct RateGovernor {
    buckets: HashMap<GovernedApi, ServiceBuckets>,
    fallback: ServiceBuckets,
    max_attempts: u32,
    attempt_timeout: Duration,
}

impl RateGovernor {
    pub fn new(microsoft: &MicrosoftRateLimit) -> Self {
        let mut buckets = HashMap::new();
        buckets.insert(
            GovernedApi::Drive,
            ServiceBuckets::new(
                ServiceLimits::defaults_for(Service::GoogleDrive)
                    .unwrap_or_else(ServiceLimits::conservative),
            ),
        );
        buckets.insert(
            GovernedApi::Docs,
            ServiceBuckets::new(ServiceLimits::google_docs()),
        );
        buckets.insert(
            GovernedApi::Slides,
            ServiceBuckets::new(ServiceLimits::google_slides()),
        );
        buckets.insert(
            GovernedApi::Gmail,
            ServiceBuckets::new(
                ServiceLimits::defaults_for(Service::GoogleGmail)
                    .unwrap_or_else(ServiceLimits::conservative),
            ),
        );
        buckets.insert(
            GovernedApi::Notion,
            ServiceBuckets::new(
                ServiceLimits::defaults_for(Service::Notion)
                    .unwrap_or_else(ServiceLimits::conservative),
            ),
        );
        buckets.insert(
            GovernedApi::MicrosoftDrive,
            ServiceBuckets::new(ServiceLimits {
                user: BucketLimits {
                    rate: microsoft.user_rate,
                    burst: microsoft.user_burst,
                },
                project: BucketLimits {
                    rate: microsoft.project_rate,
                    burst: microsoft.project_burst,
                },
            }),
        );

        Self {
            buckets,
            fallback: ServiceBuckets::new(ServiceLimits::conservative()),
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
        }
    }

    /// Block until both the project-wide and per-user buckets admit one
    /// request, or the caller is cancelled.
    ///
    /// Each admission attempt is bounded; a timed-out attempt is retried
    /// with exponential backoff (1 s doubling) up to three times before the
    /// call fails with `RateLimited`.
    pub async fn wait(
        &self,
        api: GovernedApi,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let buckets = self.buckets.get(&api).unwrap_or(&self.fallback);
        let started = std::time::Instant::now();
        let mut backoff = Duration::from_secs(1);

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff *= 2;
            }

            let admit = async {
                buckets.project.until_ready().await;
                buckets
                    .per_user
                    .until_key_ready(&user_id.to_string())
                    .await;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                outcome = tokio::time::timeout(self.attempt_timeout, admit) => {
                    if outcome.is_ok() {
                        metrics::histogram!(
                            "crawler_governor_wait_seconds",
                            "api" => api.label()
                        )
                        .record(started.elapsed().as_secs_f64());
                        return Ok(());
                    }
                    tracing::warn!(
                        api = api.label(),
                        user_id = user_id,
                        attempt = attempt + 1,
                        "Rate governor admission attempt timed out"
                    );
                }
            }
        }

        metrics::counter!("crawler_governor_rejections_total", "api" => api.label()).increment(1);
        Err(AppError::RateLimited(
            format!("rate governor admission failed for {}", api.label()),
            Some(backoff.as_secs()),
        ))
    }

    /// One-shot admission check without waiting. Used by tests and by
    /// callers that prefer to shed load instead of queueing.
    pub fn try_admit(&self, api: GovernedApi, user_id: &str) -> bool {
        let buckets = self.buckets.get(&api).unwrap_or(&self.fallback);
        if buckets.project.check().is_err() {
            return false;
        }
        buckets.per_user.check_key(&user_id.to_string()).is_ok()
    }

    /// The per-user quota configured for an admission class.
    pub fn user_quota(&self, api: GovernedApi) -> Quota {
        self.buckets
            .get(&api)
            .unwrap_or(&self.fallback)
            .user_quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor() -> RateGovernor {
        RateGovernor::new(&MicrosoftRateLimit::default())
    }

    #[test]
    fn defaults_match_quota_sheet() {
        let drive = ServiceLimits::defaults_for(Service::GoogleDrive).unwrap();
        assert_eq!(drive.user, BucketLimits { rate: 100, burst: 200 });
        assert_eq!(
            drive.project,
            BucketLimits {
                rate: 200,
                burst: 400
            }
        );

        let notion = ServiceLimits::defaults_for(Service::Notion).unwrap();
        assert_eq!(notion.user, BucketLimits { rate: 3, burst: 3 });

        assert!(ServiceLimits::defaults_for(Service::MicrosoftDrive).is_none());
    }

    #[test]
    fn burst_admits_then_denies() {
        let gov = governor();
        // Notion's burst is 3 on both layers.
        for _ in 0..3 {
            assert!(gov.try_admit(GovernedApi::Notion, "user-a"));
        }
        assert!(!gov.try_admit(GovernedApi::Notion, "user-a"));
    }

    #[test]
    fn per_user_buckets_are_independent() {
        let gov = governor();
        for _ in 0..3 {
            assert!(gov.try_admit(GovernedApi::Slides, "user-a"));
        }
        // user-b draws from its own per-user bucket regardless of user-a.
        assert!(gov.try_admit(GovernedApi::Slides, "user-b"));
    }

    #[tokio::test]
    async fn wait_admits_under_burst() {
        let gov = governor();
        let cancel = CancellationToken::new();
        gov.wait(GovernedApi::Gmail, "user-a", &cancel)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_honors_cancellation() {
        let gov = governor();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gov
            .wait(GovernedApi::Notion, "user-a", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }
}
