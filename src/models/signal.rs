use serde::{Deserialize, Serialize};

/// Serving cell as last reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellLocation {
    pub cell_id: i32,
    pub area_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DataConnectionState {
    #[default]
    Unknown,
    Disconnected,
    Connecting,
    Connected,
    Suspended,
}

/// Raw strengths carried by a single signal-strength callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalStrengths {
    pub cdma_dbm: Option<i32>,
    pub evdo_dbm: Option<i32>,
    pub evdo_snr: Option<i32>,
    pub gsm_signal_strength: Option<i32>,
}

/// Latest known radio state. `None` readings have not been reported yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSnapshot {
    pub cdma_dbm: Option<i32>,
    pub evdo_dbm: Option<i32>,
    pub evdo_snr: Option<i32>,
    pub gsm_signal_strength: Option<i32>,
    /// Empty until the service state names an operator.
    pub carrier: String,
    pub cell: Option<CellLocation>,
    pub data_state: DataConnectionState,
}

impl SignalSnapshot {
    pub fn with_strengths(&self, strengths: SignalStrengths) -> Self {
        Self {
            cdma_dbm: strengths.cdma_dbm,
            evdo_dbm: strengths.evdo_dbm,
            evdo_snr: strengths.evdo_snr,
            gsm_signal_strength: strengths.gsm_signal_strength,
            ..self.clone()
        }
    }
}
