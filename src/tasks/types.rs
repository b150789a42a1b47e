//! 远程任务的数据类型与线上格式
//!
//! 序列化格式与既有 `tasks.json` / 上报协议保持一致：
//! 状态为 `PENDING` / `SUCCESS` / `FAILURE`，类型为原协议的短横线字符串。

use serde::{Deserialize, Serialize};

/// 任务 ID（UUID v4 文本形式）
pub type TaskId = String;

/// 远程任务类型（封闭枚举，上报边界做穷尽匹配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    /// 一键长草
    #[serde(rename = "LinkStart")]
    LinkStart,
    /// 基建换班
    #[serde(rename = "LinkStart-Base")]
    LinkStartBase,
    /// 开始唤醒
    #[serde(rename = "LinkStart-WakeUp")]
    LinkStartWakeUp,
    /// 刷理智
    #[serde(rename = "LinkStart-Combat")]
    LinkStartCombat,
    /// 自动公招
    #[serde(rename = "LinkStart-Recruiting")]
    LinkStartRecruiting,
    /// 收取信用及购物
    #[serde(rename = "LinkStart-Mall")]
    LinkStartMall,
    /// 领取奖励
    #[serde(rename = "LinkStart-Mission")]
    LinkStartMission,
    /// 自动肉鸽
    #[serde(rename = "LinkStart-AutoRoguelike")]
    LinkStartAutoRoguelike,
    /// 生息演算
    #[serde(rename = "LinkStart-Reclamation")]
    LinkStartReclamation,
    /// 单抽
    #[serde(rename = "Toolbox-GachaOnce")]
    ToolboxGachaOnce,
    /// 十连
    #[serde(rename = "Toolbox-GachaTenTimes")]
    ToolboxGachaTenTimes,
    /// 截图（跟随下一次任务执行）
    #[serde(rename = "CaptureImage")]
    CaptureImage,
    /// 立刻截图
    #[serde(rename = "CaptureImageNow")]
    CaptureImageNow,
    /// 设置连接地址
    #[serde(rename = "Settings-ConnectAddress")]
    SettingsConnectAddress,
    /// 结束当前任务
    #[serde(rename = "StopTask")]
    StopTask,
    /// 心跳
    #[serde(rename = "HeartBeat")]
    HeartBeat,
}

impl TaskType {
    /// 截图类任务：上报的 payload 是 base64 图片，落盘后以路径入账
    pub fn is_capture_image(self) -> bool {
        matches!(self, TaskType::CaptureImage | TaskType::CaptureImageNow)
    }

    /// 设置类任务：提交时携带参数
    pub fn is_settings(self) -> bool {
        matches!(self, TaskType::SettingsConnectAddress)
    }
}

/// 任务状态。只允许 Pending → {Success, Failure}，终态吸收
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// 一条远程任务记录（`tasks.json` 数组的元素）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaaTask {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// 提交时刻（毫秒时间戳）。旧文件没有该字段，仅供保留策略使用
    #[serde(
        rename = "createdAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<i64>,
}

/// 远程代理上报的执行结果（HTTP 边界的请求体）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// 任务 ID
    pub task: TaskId,
    pub status: TaskStatus,
    /// 截图类任务为 base64 图片，其余任务为任意文本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// `await_completion` 的结果。超时不是错误：任务之后仍可能完成
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// 任务已离开 Pending，附带终态记录
    Completed(MaaTask),
    /// 截止时间内未观察到终态，任务记录未被改动
    TimedOut,
}
