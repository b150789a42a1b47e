//! 寻访模拟器接口
//!
//! 概率解析与保底机制属于外部模拟库的职责，这里只定义缝合面：
//! 一个带累计抽数的「抽一次」状态对象。`UpPoolSimulator` 是内建的
//! 简化实现，注册表与测试都可以通过 [`SimulatorFactory`] 换成别的实现。

use std::sync::Arc;

use crate::gacha::tables::{CharacterTable, JoinedPool};

/// 单次寻访结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pull {
    pub char_id: String,
    pub rarity: u8,
}

/// 模拟器状态：作用域为一个 (用户, 卡池) 对
pub trait Simulator: Send + Sync {
    /// 抽一次。返回 `None` 表示该池的抽取次数已耗尽（区别于卡池不存在）
    fn draw_once(&mut self) -> Option<Pull>;

    /// 累计已抽次数
    fn draw_count(&self) -> u32;
}

/// 注册表按 (用户, 卡池) 首次访问时创建模拟器所用的工厂
pub type SimulatorFactory =
    Arc<dyn Fn(&JoinedPool, &CharacterTable) -> Box<dyn Simulator> + Send + Sync>;

/// 内建实现：up 角色与全角色池的加权抽取，受服务端表的抽取上限约束。
/// 熵来自 UUID v4 的随机字节。
pub struct UpPoolSimulator {
    up_chars: Vec<Pull>,
    all_chars: Vec<Pull>,
    limit: Option<u32>,
    count: u32,
}

impl UpPoolSimulator {
    pub fn new(pool: &JoinedPool, characters: &CharacterTable) -> Self {
        let up_chars = pool
            .server
            .up_char_list
            .iter()
            .filter_map(|id| {
                characters.get(id).map(|c| Pull {
                    char_id: id.clone(),
                    rarity: c.rarity,
                })
            })
            .collect();
        let mut all_chars: Vec<Pull> = characters
            .iter()
            .map(|(id, c)| Pull {
                char_id: id.clone(),
                rarity: c.rarity,
            })
            .collect();
        // HashMap 迭代序不稳定，固定池序以便结果只依赖熵
        all_chars.sort_by(|a, b| a.char_id.cmp(&b.char_id));
        Self {
            up_chars,
            all_chars,
            limit: pool.server.limit_times,
            count: 0,
        }
    }

    fn entropy() -> u64 {
        uuid::Uuid::new_v4().as_u128() as u64
    }
}

impl Simulator for UpPoolSimulator {
    fn draw_once(&mut self) -> Option<Pull> {
        if let Some(limit) = self.limit {
            if self.count >= limit {
                return None;
            }
        }
        if self.up_chars.is_empty() && self.all_chars.is_empty() {
            return None;
        }
        self.count += 1;

        let roll = Self::entropy();
        // 一半概率出 up 角色，其余从全池取
        let pool = if !self.up_chars.is_empty() && roll % 2 == 0 {
            &self.up_chars
        } else {
            &self.all_chars
        };
        pool.get(((roll >> 1) % pool.len() as u64) as usize).cloned()
    }

    fn draw_count(&self) -> u32 {
        self.count
    }
}
