use tokio_cron_scheduler::{Job, JobScheduler};

use std::sync::Arc;
use tracing::{error, info};

use crate::core::ranking::RankingService;
use crate::error::RankResult;

pub struct Scheduler {
    scheduler: JobScheduler,
    service: Arc<RankingService>,
}

pub enum JobProcess<'schedule> {
    PurgeScoreHistory(&'schedule str),
    EvictExpiredCaches(&'schedule str),
}

impl Scheduler {
    pub async fn new(service: Arc<RankingService>) -> RankResult<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Scheduler { scheduler, service })
    }

    pub async fn add_job(&self, job_process: JobProcess<'_>) -> RankResult<uuid::Uuid> {
        let job = match job_process {
            JobProcess::PurgeScoreHistory(schedule) => {
                purge_score_history_job(schedule, self.service.clone())?
            }
            JobProcess::EvictExpiredCaches(schedule) => {
                evict_expired_caches_job(schedule, self.service.clone())?
            }
        };
        Ok(self.scheduler.add(job).await?)
    }

    pub async fn start(&self) -> RankResult<()> {
        Ok(self.scheduler.start().await?)
    }

    pub async fn shutdown(&mut self) -> RankResult<()> {
        Ok(self.scheduler.shutdown().await?)
    }
}

//////////////////
// Jobs definition
//////////////////

fn purge_score_history_job(schedule: &str, service: Arc<RankingService>) -> RankResult<Job> {
    let job = Job::new_async(schedule, move |uuid, mut l| {
        let service = service.clone();
        Box::pin(async move {
            if let Err(e) = service.purge_expired_history().await {
                error!(error = %e, "Could not purge expired score records");
            }

            // Query the next execution time for this job
            match l.next_tick_for_job(uuid).await {
                Ok(Some(ts)) => info!("Next score history purge at {:?}", ts),
                _ => error!("Could not get next tick for score history purge job"),
            }
        })
    })?;
    Ok(job)
}

fn evict_expired_caches_job(schedule: &str, service: Arc<RankingService>) -> RankResult<Job> {
    let job = Job::new_async(schedule, move |uuid, mut l| {
        let service = service.clone();
        Box::pin(async move {
            if let Err(e) = service.evict_expired_caches().await {
                error!(error = %e, "Could not evict expired cache entries");
            }

            match l.next_tick_for_job(uuid).await {
                Ok(Some(ts)) => info!("Next cache eviction at {:?}", ts),
                _ => error!("Could not get next tick for cache eviction job"),
            }
        })
    })?;
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[tokio::test]
    async fn jobs_are_registered() {
        let service = Arc::new(RankingService::in_memory(Settings::default()));
        let scheduler = Scheduler::new(service).await.unwrap();
        let purge = scheduler
            .add_job(JobProcess::PurgeScoreHistory("0 0 3 * * *"))
            .await
            .unwrap();
        let evict = scheduler
            .add_job(JobProcess::EvictExpiredCaches("0 */5 * * * *"))
            .await
            .unwrap();
        assert_ne!(purge, evict);
    }

    #[tokio::test]
    async fn invalid_schedule_is_rejected() {
        let service = Arc::new(RankingService::in_memory(Settings::default()));
        let scheduler = Scheduler::new(service).await.unwrap();
        assert!(scheduler
            .add_job(JobProcess::PurgeScoreHistory("every tuesday"))
            .await
            .is_err());
    }
}
