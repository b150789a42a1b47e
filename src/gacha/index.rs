//! 卡池检索/展示索引
//!
//! 把客户端表按显示名分组：同名多期的常驻池（复用同一模板文案）
//! 改写显示名，归一化常驻短语、追加开放日期，服务端表给出 up 角色时
//! 再追加角色名，使各期互相可分辨。压平后按开放时间倒序排列，
//! 每条记录预计算检索别名（纯名称 / 名称+id / 名称+角色名）。

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset};

use crate::gacha::tables::{CharacterTable, GachaClientTable, GachaServerTable};

/// 常驻池模板文案，消歧时归一化为「标准寻访」
const STANDARD_POOL_PHRASE: &str = "适合多种场合的强力干员";

/// 索引中的一条卡池记录
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub pool_id: String,
    /// 消歧后的显示名
    pub display_name: String,
    pub open_time: i64,
    aliases: Vec<String>,
}

impl PoolEntry {
    /// 任一别名包含 `query` 即命中
    pub fn matches(&self, query: &str) -> bool {
        self.aliases.iter().any(|a| a.contains(query))
    }
}

/// 由两表并联构建索引。调用方负责缓存（见 `TableCache::search_index`）
pub(crate) fn build_index(
    client: &GachaClientTable,
    server: &GachaServerTable,
    characters: &CharacterTable,
) -> Vec<PoolEntry> {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, pool) in client.gacha_pool_client.iter().enumerate() {
        groups.entry(pool.gacha_pool_name.as_str()).or_default().push(i);
    }

    let mut entries = Vec::with_capacity(client.gacha_pool_client.len());
    for (name, indices) in groups {
        let recurring = indices.len() > 1;
        for i in indices {
            let pool = &client.gacha_pool_client[i];
            let up_names = up_char_names(server, characters, &pool.gacha_pool_id);

            let mut display = name.to_string();
            if recurring {
                display = display.replace(STANDARD_POOL_PHRASE, "标准寻访");
                display.push_str(&format!(" ({})", format_open_date(pool.open_time)));
                if !up_names.is_empty() {
                    display.push_str(&format!(" {}", up_names.join("·")));
                }
            }

            let mut aliases = vec![
                display.clone(),
                format!("{} {}", display, pool.gacha_pool_id),
            ];
            if !up_names.is_empty() {
                aliases.push(format!("{} {}", display, up_names.join(" ")));
            }

            entries.push(PoolEntry {
                pool_id: pool.gacha_pool_id.clone(),
                display_name: display,
                open_time: pool.open_time,
                aliases,
            });
        }
    }

    // 最新优先
    entries.sort_by(|a, b| b.open_time.cmp(&a.open_time));
    entries
}

fn up_char_names(
    server: &GachaServerTable,
    characters: &CharacterTable,
    pool_id: &str,
) -> Vec<String> {
    server
        .gacha_pool_client
        .iter()
        .find(|s| s.gacha_pool_id == pool_id)
        .map(|s| {
            s.up_char_list
                .iter()
                .filter_map(|id| characters.get(id).map(|c| c.name.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// 开放时间（秒）→「YYYY年M月D日」，按游戏服务器时区（UTC+8）
fn format_open_date(open_time: i64) -> String {
    let Some(utc) = DateTime::from_timestamp(open_time, 0) else {
        return String::new();
    };
    // 偏移量恒在合法范围内
    let cn = utc.with_timezone(&FixedOffset::east_opt(8 * 3600).unwrap());
    format!("{}年{}月{}日", cn.year(), cn.month(), cn.day())
}
