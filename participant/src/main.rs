use std::process;

use log::{error, info};
use machine_learning::{
    dataset::Dataset,
    training::{SoftmaxConfig, SoftmaxTrainer},
};
use participant::{
    IdentityStore, JsonIdentityStore, Participant, ParticipantConfig, RoundController,
    SessionManager, config::ConfigErr, metrics::CsvMetrics,
};
use rand::{SeedableRng, rngs::StdRng};

const SAMPLES_PER_CLASS: usize = 64;
const FEATURES: usize = 4;
const CLASSES: usize = 3;
const SPREAD: f32 = 1.0;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match ParticipantConfig::from_env() {
        Ok(config) => config,
        Err(e @ ConfigErr::MissingVar(_)) => {
            error!("{e}");
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let store = JsonIdentityStore::open_or_init(&config.config_path)?;
    let identity = store.load_identity()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let dataset = Dataset::blobs(SAMPLES_PER_CLASS, FEATURES, CLASSES, SPREAD, &mut rng)?;

    let mut trainer_config = SoftmaxConfig::default();
    if let Some(max_rounds) = config.max_rounds {
        trainer_config.max_rounds = max_rounds;
    }
    let trainer = SoftmaxTrainer::new(dataset, trainer_config)?;

    let metrics = CsvMetrics::create(&config.metrics_path)?;
    let rounds = RoundController::new(trainer, metrics, config.transfer_mode);
    let session = SessionManager::new(identity, store);

    let mut participant =
        Participant::new(session, rounds).with_max_frame_len(config.max_frame_len);

    info!(
        "starting participant against {} with {} transfers",
        config.server_uri, config.transfer_mode
    );
    participant.connect_blocking(&config.server_uri)?;

    info!(rounds = participant.rounds().completed_rounds(); "participant finished");
    Ok(())
}
