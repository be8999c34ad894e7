use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{ProbeError, ProbeResult};
use crate::probe::{DEFAULT_ENDPOINT, Probe};
use crate::transport::Client;

pub const ENDPOINT_ENV: &str = "PREDICT_PROBE_ENDPOINT";

/// Send one random 48x48 image to a prediction service and print its answer.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "predict-probe", version)]
pub struct ProbeArgs {
    /// Prediction endpoint receiving `{"image": [...]}`
    #[arg(long, env = ENDPOINT_ENV, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Per-request timeout in milliseconds; unset waits indefinitely
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Seed for a reproducible image
    #[arg(long, conflicts_with = "image")]
    pub seed: Option<u64>,

    /// Upload a JPEG or PNG to `/predict/image` instead of a random image
    #[arg(long, value_name = "FILE", conflicts_with = "health")]
    pub image: Option<PathBuf>,

    /// Query `/health` on the endpoint's host instead of predicting
    #[arg(long)]
    pub health: bool,
}

impl ProbeArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn probe(&self) -> Probe {
        let mut probe = Probe::new(self.endpoint.clone());
        if let Some(timeout) = self.timeout() {
            probe = probe.with_timeout(timeout);
        }
        if let Some(seed) = self.seed {
            probe = probe.with_seed(seed);
        }
        probe
    }

    /// Runs the selected command over HTTP and writes its answer to `out`.
    pub async fn execute<W: Write>(&self, out: W) -> ProbeResult<()> {
        self.execute_with(Client::new(), out).await
    }

    /// Like [`ProbeArgs::execute`] over a caller-supplied client. Nothing is
    /// written unless the service answered; an unhealthy status is printed
    /// and then reported as an error.
    pub async fn execute_with<W: Write>(&self, client: Client, mut out: W) -> ProbeResult<()> {
        let probe = self.probe().with_client(client);

        if self.health {
            let status = probe.health().await?;
            writeln!(out, "{}", status.status)?;
            out.flush()?;
            if !status.is_healthy() {
                return Err(ProbeError::unhealthy(&status.status));
            }
            return Ok(());
        }

        let outcome = match &self.image {
            Some(path) => probe.upload(path).await?,
            None => probe.run().await?,
        };
        outcome.write_to(out)
    }
}
