//! Live notification fan-out.
//!
//! ```text
//!   producers ──broadcast──►  control loop  ──try_send──►  queue (256) ──► writer ──► transport
//!                              (owns set)                                           │
//!   transport ──► reader ──broadcast──┘                                             │
//!                    └─────────── either loop exits: cancel subscriber token ◄──────┘
//! ```

mod hub;

pub use hub::{NotificationHub, SUBSCRIBER_QUEUE_CAPACITY};

use serde::{Deserialize, Serialize};

/// One line of deploy command output, as streamed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    pub project: String,
    pub environment: String,
    pub stdout_line: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_output_wire_format() {
        let line = DeployOutput {
            project: "web".to_string(),
            environment: "prod".to_string(),
            stdout_line: "Restarting unicorn".to_string(),
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["project"], "web");
        assert_eq!(json["environment"], "prod");
        assert_eq!(json["stdoutLine"], "Restarting unicorn");
    }
}
