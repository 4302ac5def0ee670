pub mod rank;
pub mod tournament;

pub use rank::{rank_generation, sort_by_fitness};
pub use tournament::TournamentSelection;
