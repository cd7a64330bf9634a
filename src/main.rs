use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

use causal_prod2vec::application::train_use_case::{TrainConfig, TrainUseCase};

type MyBackend = Autodiff<NdArray>;

const CONFIG_PATH: &str = "prod2vec.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("causal_prod2vec=info".parse()?),
        )
        .init();

    let config = TrainConfig::load_or_default(CONFIG_PATH)?;
    let device = NdArrayDevice::Cpu;
    tracing::info!("Using NdArray device: {:?}", device);

    let report = TrainUseCase::new(config).execute::<MyBackend>(&device)?;

    match &report.validation {
        Some(v) => println!(
            "\nDone after {} steps. Control-set log loss: {:.4} (baseline rate {:.4})",
            report.steps, v.log_loss, report.baseline_rate,
        ),
        None => println!(
            "\nDone after {} steps (no validation split, baseline rate {:.4})",
            report.steps, report.baseline_rate,
        ),
    }
    Ok(())
}
