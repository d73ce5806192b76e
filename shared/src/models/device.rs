//! Device Snapshot Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 设备心跳快照
///
/// `ingredients` 为原料编码 → 库存标记（布尔型上报已归一为 0 / 1），
/// `health` 为子系统健康标记原样保存。只有每台设备的最新一条参与判断。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusSnapshot {
    pub id: i64,
    pub device_id: String,
    pub ingredients: BTreeMap<String, f64>,
    pub health: BTreeMap<String, serde_json::Value>,
    pub created_at: i64,
}

impl DeviceStatusSnapshot {
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }
}

/// 待写入的快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotCreate {
    pub device_id: String,
    pub ingredients: BTreeMap<String, f64>,
    pub health: BTreeMap<String, serde_json::Value>,
}
