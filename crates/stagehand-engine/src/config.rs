use std::time::Duration;

use crate::coordinator::Coordinator;

/// Default frame-clock period: roughly one display frame.
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_millis(16);

/// Builder for a [`Coordinator`].
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    owner: String,
    frame_period: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            owner: "stagehand".to_owned(),
            frame_period: DEFAULT_FRAME_PERIOD,
        }
    }
}

impl CoordinatorConfig {
    /// Display name of the host object this coordinator works for; shows
    /// up in payload contexts and log lines.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Period of the shared frame clock. The clock starts lazily on the
    /// first frame registration.
    pub fn frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period;
        self
    }

    pub fn build<V: Clone + Send + 'static>(self) -> Coordinator<V> {
        Coordinator::from_config(self.owner, self.frame_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_applies_the_owner_tag() {
        let coordinator: Coordinator<u32> = CoordinatorConfig::default()
            .owner("editor")
            .frame_period(Duration::from_millis(8))
            .build();
        assert_eq!(coordinator.owner(), "editor");
    }
}
