//! Browser worker actor
//!
//! A single task owns the browser runtime and runs every live scrape one
//! after another. Callers hold a cloneable [`WorkerHandle`], submit typed
//! jobs over a channel and wait for the reply with an upper bound.

use crate::browser::BrowserRuntime;
use crate::config::WorkerConfig;
use crate::error::{ResolveError, Result};
use crate::models::{AiringEpisode, EpisodePage, PopularAnime};
use crate::scrape::SiteScraper;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Job {
    Episodes {
        anime_id: String,
        page: u32,
        reply: Reply<EpisodePage>,
    },
    Iframe {
        anime_id: String,
        session: String,
        reply: Reply<String>,
    },
    Airing {
        reply: Reply<Vec<AiringEpisode>>,
    },
    Popular {
        reply: Reply<Vec<PopularAnime>>,
    },
}

/// Cloneable handle to the browser worker
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<Job>,
    ready: watch::Receiver<bool>,
    call_timeout: Duration,
}

impl WorkerHandle {
    /// Start the worker task. It starts the runtime first and only reports
    /// ready once that succeeded.
    pub fn spawn(runtime: Arc<dyn BrowserRuntime>, scraper: SiteScraper, config: &WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
        let (ready_tx, ready) = watch::channel(false);
        tokio::spawn(run(runtime, scraper, receiver, ready_tx));

        Self {
            sender,
            ready,
            call_timeout: config.call_timeout(),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the runtime to come up; false if it did not within `timeout`
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.clone();
        let reached = matches!(
            tokio::time::timeout(timeout, ready.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        );
        reached
    }

    async fn submit<T>(&self, job: impl FnOnce(Reply<T>) -> Job) -> Result<T> {
        if !self.is_ready() {
            return Err(ResolveError::NotReady);
        }

        let (reply, response) = oneshot::channel();
        let job = job(reply);
        let call = async {
            self.sender.send(job).await.map_err(|_| ResolveError::WorkerUnavailable)?;
            response.await.map_err(|_| ResolveError::WorkerUnavailable)?
        };

        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("⏱️ Worker call timed out after {:?}", self.call_timeout);
                Err(ResolveError::WorkerTimeout(self.call_timeout))
            }
        }
    }

    pub async fn episodes(&self, anime_id: &str, page: u32) -> Result<EpisodePage> {
        let anime_id = anime_id.to_string();
        self.submit(|reply| Job::Episodes { anime_id, page, reply }).await
    }

    pub async fn iframe(&self, anime_id: &str, session: &str) -> Result<String> {
        let anime_id = anime_id.to_string();
        let session = session.to_string();
        self.submit(|reply| Job::Iframe {
            anime_id,
            session,
            reply,
        })
        .await
    }

    pub async fn airing(&self) -> Result<Vec<AiringEpisode>> {
        self.submit(|reply| Job::Airing { reply }).await
    }

    pub async fn popular(&self) -> Result<Vec<PopularAnime>> {
        self.submit(|reply| Job::Popular { reply }).await
    }
}

/// Deliver a job result unless the caller already gave up
fn deliver<T>(reply: Reply<T>, outcome: Result<T>) {
    if reply.send(outcome).is_err() {
        debug!("Caller stopped waiting, result dropped");
    }
}

async fn run(
    runtime: Arc<dyn BrowserRuntime>,
    scraper: SiteScraper,
    mut receiver: mpsc::Receiver<Job>,
    ready: watch::Sender<bool>,
) {
    info!("🚀 Starting browser runtime...");
    if let Err(e) = runtime.start().await {
        error!("❌ Browser runtime setup failed: {:#}", e);
        return;
    }
    if ready.send(true).is_err() {
        warn!("⚠️ No worker handles left, stopping");
        return;
    }
    info!("✅ Browser worker ready");

    while let Some(job) = receiver.recv().await {
        let runtime = runtime.as_ref();
        match job {
            Job::Episodes { anime_id, page, reply } => {
                if reply.is_closed() {
                    continue;
                }
                let outcome = scraper.episodes(runtime, &anime_id, page).await;
                deliver(reply, outcome);
            }
            Job::Iframe {
                anime_id,
                session,
                reply,
            } => {
                if reply.is_closed() {
                    continue;
                }
                let outcome = scraper.iframe(runtime, &anime_id, &session).await;
                deliver(reply, outcome);
            }
            Job::Airing { reply } => {
                if reply.is_closed() {
                    continue;
                }
                let outcome = scraper.airing(runtime).await;
                deliver(reply, outcome);
            }
            Job::Popular { reply } => {
                if reply.is_closed() {
                    continue;
                }
                let outcome = scraper.popular(runtime).await;
                deliver(reply, outcome);
            }
        }
    }

    info!("🛑 Browser worker stopped");
}
