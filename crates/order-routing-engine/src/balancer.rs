//! 团队负载均衡器
//!
//! 当路由目标是团队时，按团队配置的策略挑选具体成员。选中即递增成员与
//! 团队的 current_load；均衡器本身从不递减 —— 负载释放由订单生命周期
//! 代码调用 `release` 完成，这里只提供接缝。

use crate::error::{Result, RoutingError};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 团队路由策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    RoundRobin,
    LeastLoaded,
    SkillBased,
    PriorityBased,
    Random,
    /// 未识别的策略值，选取首个可用成员兜底
    #[serde(other)]
    Unknown,
}

/// 团队路由配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRoutingConfig {
    pub team_id: String,
    pub name: String,
    pub strategy: RoutingStrategy,
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// 团队成员
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub staff_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub current_load: u32,
}

fn default_true() -> bool {
    true
}

/// 员工路由能力行：(员工, 能力类型, 能力值) 唯一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffRoutingCapability {
    pub staff_id: String,
    pub capability_type: String,
    pub capability_value: String,
    #[serde(default = "default_true")]
    pub available: bool,
    /// 技能等级 1-5
    #[serde(default = "default_skill")]
    pub skill_level: u8,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
    #[serde(default)]
    pub preference_weight: i32,
}

fn default_skill() -> u8 {
    3
}

struct TeamState {
    config: TeamRoutingConfig,
    members: Vec<TeamMember>,
    rr_cursor: usize,
    current_load: u32,
}

/// 团队目录与负载均衡器
#[derive(Clone)]
pub struct TeamDirectory {
    teams: Arc<DashMap<String, TeamState>>,
    /// 按员工 id 索引的能力行
    capabilities: Arc<DashMap<String, Vec<StaffRoutingCapability>>>,
}

impl TeamDirectory {
    pub fn new() -> Self {
        Self {
            teams: Arc::new(DashMap::new()),
            capabilities: Arc::new(DashMap::new()),
        }
    }

    pub fn upsert_team(&self, config: TeamRoutingConfig, members: Vec<TeamMember>) {
        let team_id = config.team_id.clone();
        self.teams.insert(
            team_id,
            TeamState {
                config,
                members,
                rr_cursor: 0,
                current_load: 0,
            },
        );
    }

    pub fn set_capabilities(&self, staff_id: impl Into<String>, caps: Vec<StaffRoutingCapability>) {
        self.capabilities.insert(staff_id.into(), caps);
    }

    pub fn team_load(&self, team_id: &str) -> Option<u32> {
        self.teams.get(team_id).map(|t| t.current_load)
    }

    pub fn member_load(&self, team_id: &str, staff_id: &str) -> Option<u32> {
        self.teams.get(team_id).and_then(|t| {
            t.members
                .iter()
                .find(|m| m.staff_id == staff_id)
                .map(|m| m.current_load)
        })
    }

    /// 按团队策略选择成员并递增负载
    ///
    /// `requirements` 为从订单推导的能力需求，仅 skill_based 策略使用。
    #[instrument(skip(self, requirements))]
    pub fn select_member(&self, team_id: &str, requirements: &[String]) -> Result<String> {
        let mut state = self
            .teams
            .get_mut(team_id)
            .ok_or_else(|| RoutingError::TeamNotFound(team_id.to_string()))?;

        let active: Vec<usize> = state
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.active)
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            warn!(team_id = %team_id, "团队无可用成员");
            return Err(RoutingError::NoAvailableMember {
                team_id: team_id.to_string(),
            });
        }

        let strategy = state.config.strategy;
        let chosen = self.choose(&state, &active, requirements);
        if strategy == RoutingStrategy::RoundRobin {
            state.rr_cursor = state.rr_cursor.wrapping_add(1);
        }

        state.members[chosen].current_load += 1;
        state.current_load += 1;
        let staff_id = state.members[chosen].staff_id.clone();

        debug!(
            team_id = %team_id,
            staff_id = %staff_id,
            strategy = ?strategy,
            member_load = state.members[chosen].current_load,
            "已分配团队成员"
        );

        Ok(staff_id)
    }

    /// 只读试选：按同样的策略给出将被选中的成员，但不推进轮询游标、
    /// 不递增任何负载。供试算评估使用，保证干跑不影响真实分派。
    pub fn peek_member(&self, team_id: &str, requirements: &[String]) -> Result<String> {
        let state = self
            .teams
            .get(team_id)
            .ok_or_else(|| RoutingError::TeamNotFound(team_id.to_string()))?;

        let active: Vec<usize> = state
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.active)
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            return Err(RoutingError::NoAvailableMember {
                team_id: team_id.to_string(),
            });
        }

        let chosen = self.choose(&state, &active, requirements);
        Ok(state.members[chosen].staff_id.clone())
    }

    /// 策略分派本体，只读；游标推进与负载递增由 select_member 负责
    fn choose(&self, state: &TeamState, active: &[usize], requirements: &[String]) -> usize {
        match state.config.strategy {
            RoutingStrategy::RoundRobin => active[state.rr_cursor % active.len()],
            RoutingStrategy::LeastLoaded => Self::least_loaded(&state.members, active),
            RoutingStrategy::SkillBased => {
                let qualified: Vec<usize> = active
                    .iter()
                    .copied()
                    .filter(|&i| self.meets_requirements(&state.members[i].staff_id, requirements))
                    .collect();
                if qualified.is_empty() {
                    // 无人满足全部能力需求时退回 least_loaded
                    Self::least_loaded(&state.members, active)
                } else {
                    Self::least_loaded(&state.members, &qualified)
                }
            }
            RoutingStrategy::PriorityBased => active
                .iter()
                .copied()
                .max_by_key(|&i| state.members[i].weight)
                .unwrap_or(active[0]),
            RoutingStrategy::Random => {
                let idx = rand::rng().random_range(0..active.len());
                active[idx]
            }
            RoutingStrategy::Unknown => active[0],
        }
    }

    /// 订单完成时的负载释放接缝，由订单生命周期代码调用
    pub fn release(&self, team_id: &str, staff_id: &str) {
        if let Some(mut state) = self.teams.get_mut(team_id) {
            state.current_load = state.current_load.saturating_sub(1);
            if let Some(member) = state.members.iter_mut().find(|m| m.staff_id == staff_id) {
                member.current_load = member.current_load.saturating_sub(1);
            }
        }
    }

    /// 成员是否具备全部要求的能力
    ///
    /// 能力值按大小写不敏感匹配；不可用的能力行与达到并发上限的能力行不计。
    fn meets_requirements(&self, staff_id: &str, requirements: &[String]) -> bool {
        if requirements.is_empty() {
            return true;
        }
        let Some(caps) = self.capabilities.get(staff_id) else {
            return false;
        };
        requirements.iter().all(|req| {
            caps.iter().any(|c| {
                c.available
                    && c.capability_value.eq_ignore_ascii_case(req)
                    && c.max_concurrent.is_none_or(|max| max > 0)
            })
        })
    }

    fn least_loaded(members: &[TeamMember], indices: &[usize]) -> usize {
        // min_by_key 在并列时返回首个，天然满足"按列表顺序破平"
        indices
            .iter()
            .copied()
            .min_by_key(|&i| members[i].current_load)
            .unwrap_or(indices[0])
    }
}

impl Default for TeamDirectory {
    fn default() -> Self {
        Self::new()
    }
}
