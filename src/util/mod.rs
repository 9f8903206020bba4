mod period_clock;
mod validity;

#[cfg(test)]
mod tests;

pub use period_clock::PeriodClock;
pub use validity::Validity;
