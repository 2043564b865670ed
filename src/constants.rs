/// 列表接口默认分页大小
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// 列表接口最大分页大小
pub const MAX_PAGE_SIZE: u64 = 100;

/// 学习队列默认长度
pub const DEFAULT_QUEUE_LIMIT: usize = 30;

/// 学习队列长度上限
pub const MAX_QUEUE_LIMIT: usize = 100;

/// 每日新卡片默认上限
pub const DEFAULT_NEW_LIMIT: usize = 10;

/// 滚动复习偏移（自首次见到该卡片起的天数）
pub const ROLLING_OFFSETS_DAYS: [i64; 4] = [1, 2, 4, 7];

/// lapses 达到该阈值的卡片标记为 leech
pub const LEECH_THRESHOLD: u32 = 8;

/// 导入批次大小（每批一次性写入 Store）
pub const IMPORT_BATCH_SIZE: usize = 500;

/// 导入任务保留的行级错误数量上限
pub const IMPORT_MAX_ROW_ERRORS: usize = 50;

/// Suggest 接口默认返回数量
pub const DEFAULT_SUGGEST_LIMIT: usize = 10;

/// Suggest 接口最大返回数量
pub const MAX_SUGGEST_LIMIT: usize = 50;

/// 进度统计最大天数窗口
pub const MAX_PROGRESS_DAYS: i64 = 365;

/// 到期预测最大天数窗口
pub const MAX_FORECAST_DAYS: i64 = 30;

/// 估算学习时间：每张卡片秒数
pub const ESTIMATED_SECONDS_PER_CARD: u64 = 30;
