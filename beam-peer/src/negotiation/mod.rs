mod negotiation_record;
mod negotiator;

pub use negotiation_record::*;
pub use negotiator::*;
