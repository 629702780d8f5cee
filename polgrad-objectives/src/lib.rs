pub mod builder;
pub mod diagnostics;
pub mod kind;
pub mod objective;
pub mod ppo_clip;
pub mod vanilla_pg;

pub use builder::{ObjectiveBuilder, ObjectiveConfig};
pub use kind::ObjectiveKind;
pub use objective::{
    GradsAndMetrics, ObjectiveAux, ObjectiveCore, ObjectiveOutput, PolicyObjective, UpdateReport,
    UpdateStatus, average_grads,
};
pub use ppo_clip::PpoClip;
pub use vanilla_pg::VanillaPg;
