//! Track playback: stream selection, decode engine control and delivery to
//! subscribed connections

mod engine;
mod epoch;
mod events;
mod player;
mod selector;
mod silence;
mod subscription;

pub use engine::{
    DecodeEngine, EngineEvent, EngineEvents, EngineFactory, EngineMessage, EngineSnapshot,
    EqualizerBand,
};
pub use epoch::PlayEpoch;
pub use events::{PlayerEvent, PlayerState};
pub use player::TrackPlayer;
pub use selector::get_best_stream;
pub use silence::SilenceScheduler;
pub use subscription::SubscriptionHandle;
