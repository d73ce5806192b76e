use std::sync::Arc;

use crate::core::{Config, Result};
use crate::db::{self, Storage};
use crate::inventory::{
    AlertEngine, AvailabilityEvaluator, IngredientCatalog, IngredientResolver, InventoryLedger,
};
use crate::message::NotificationBus;
use crate::orders::{DeviceQueue, OrderStore};

/// 服务器状态 - 持有所有服务的共享引用
///
/// 所有服务内部都是 `Arc`，克隆成本很低，直接作为 axum `State` 使用。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | storage | 存储后端 (SQLite / 内存) |
/// | bus | 变更通知总线 |
/// | orders | 订单存储 |
/// | queue | 设备轮询协议 |
/// | ledger | 库存账本 |
/// | alerts | 告警引擎 |
/// | availability | 可售判断 + 商品 |
/// | epoch | 实例启动标识 (每次启动生成) |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub bus: NotificationBus,
    pub catalog: Arc<IngredientCatalog>,
    pub orders: OrderStore,
    pub queue: DeviceQueue,
    pub ledger: InventoryLedger,
    pub alerts: AlertEngine,
    pub availability: AvailabilityEvaluator,
    pub epoch: String,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 1. 工作目录结构
    /// 2. 存储后端 (按 `DATABASE_URL`，含迁移)
    /// 3. 各服务
    pub async fn initialize(config: &Config) -> Result<Self> {
        config.ensure_work_dir_structure()?;
        let storage = db::open(&config.database_url).await?;
        tracing::info!(backend = storage.backend(), "Storage ready");
        Ok(Self::with_storage(config.clone(), storage))
    }

    /// 在给定存储上装配全部服务
    pub fn with_storage(config: Config, storage: Arc<dyn Storage>) -> Self {
        let bus = NotificationBus::new();
        let catalog = Arc::new(IngredientCatalog::standard());

        let alerts = AlertEngine::new(storage.clone(), bus.clone());
        let ledger = InventoryLedger::new(
            storage.clone(),
            IngredientResolver::new(catalog.clone()),
            alerts.clone(),
            bus.clone(),
        );
        let orders = OrderStore::new(
            storage.clone(),
            ledger.clone(),
            bus.clone(),
            config.consumption_policy,
            config.default_device_id.clone(),
            config.category_devices.clone(),
        );
        let queue = DeviceQueue::new(orders.clone(), bus.clone(), config.default_device_id.clone());
        let availability = AvailabilityEvaluator::new(
            storage.clone(),
            catalog.clone(),
            bus.clone(),
            config.snapshot_max_age_secs,
            config.default_device_id.clone(),
        );

        Self {
            config,
            storage,
            bus,
            catalog,
            orders,
            queue,
            ledger,
            alerts,
            availability,
            epoch: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 启动后台任务
    ///
    /// - 通知日志任务
    pub fn start_background_tasks(&self) -> tokio::task::JoinHandle<()> {
        self.bus.spawn_logger()
    }

    /// 存储后端名称
    pub fn backend(&self) -> &'static str {
        self.storage.backend()
    }
}
