//! User agent rotation.

/// Cycles through a fixed list of user agents as pages advance.
///
/// The position persists across sources, so the second listing continues
/// from whatever agent the first one ended on.
#[derive(Debug, Clone)]
pub struct UserAgentRotator {
    agents: Vec<String>,
    rotate_every: u32,
    position: usize,
}

impl UserAgentRotator {
    /// `agents` must be non-empty; config loading enforces it.
    pub fn new(agents: Vec<String>, rotate_every: u32) -> Self {
        Self {
            agents,
            rotate_every: rotate_every.max(1),
            position: 0,
        }
    }

    pub fn current(&self) -> &str {
        &self.agents[self.position]
    }

    /// Agent to use for `page`, advancing first when the page number is a
    /// multiple of the rotation interval.
    pub fn for_page(&mut self, page: u32) -> &str {
        if page % self.rotate_every == 0 {
            self.position = (self.position + 1) % self.agents.len();
            tracing::info!("User agent rotated to {}", self.current());
        }
        self.current()
    }
}
