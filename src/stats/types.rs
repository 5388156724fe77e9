use serde::{Deserialize, Serialize};

/// Weight of a new sample in the moving averages.
pub const SMOOTHING_FACTOR: f32 = 0.1;

/// `value = (1 - alpha) * value + alpha * sample`.
pub fn smooth(value: &mut f32, sample: f32) {
    *value = (1.0 - SMOOTHING_FACTOR) * *value + SMOOTHING_FACTOR * sample;
}

/// Round-trip observations for one acking peer. Timeouts are not recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerStats {
    pub min_rtt: f32,
    pub max_rtt: f32,
    pub avg_rtt: f32,
    /// Peer-reported average delay between receiving and dispatching a message.
    pub avg_dispatch_delay: f32,
    pub samples: u64,
}

impl PeerStats {
    pub fn observe(&mut self, rtt: f32, dispatch_delay: f32) {
        if self.samples == 0 {
            self.min_rtt = rtt;
            self.max_rtt = rtt;
            self.avg_rtt = rtt;
        } else {
            self.min_rtt = self.min_rtt.min(rtt);
            self.max_rtt = self.max_rtt.max(rtt);
            smooth(&mut self.avg_rtt, rtt);
        }
        self.avg_dispatch_delay = dispatch_delay;
        self.samples += 1;
    }
}

/// Completion times for one message type, including resends and every ack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStats {
    pub min_rtt: f32,
    pub max_rtt: f32,
    pub avg_rtt: f32,
    pub samples: u64,
}

impl MessageStats {
    pub fn observe(&mut self, rtt: f32) {
        if self.samples == 0 {
            self.min_rtt = rtt;
            self.max_rtt = rtt;
            self.avg_rtt = rtt;
        } else {
            self.min_rtt = self.min_rtt.min(rtt);
            self.max_rtt = self.max_rtt.max(rtt);
            smooth(&mut self.avg_rtt, rtt);
        }
        self.samples += 1;
    }
}
