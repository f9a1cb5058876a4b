use minijinja::{Environment, Template};
use once_cell::sync::Lazy;
use strum::{EnumIter, IntoEnumIterator};
use tracing::{error, info};

use crate::error::RankResult;

static TEMPLATES_ENVIRONMENT: Lazy<Environment> = Lazy::new(|| {
    info!("Initializing templating engine environment.");
    let mut env = Environment::new();

    // Use strum to iterate over the variants of the enum.
    for template in MessageTemplate::iter() {
        if let Err(e) = env.add_template(template.name(), template.template()) {
            error!(template = template.name(), error = %e, "Invalid template, skipped");
        }
    }

    env
});

#[derive(Debug, Clone, Copy, EnumIter)]
pub enum MessageTemplate {
    Help,
    LeaderboardCreated,
    LeaderboardList,
    ScoreSubmitted,
    Rankings,
    UserRank,
    Rebuilt,
    Stats,
    Deleted,
    CacheCleared,
    UserEvicted,
    Health,
}

impl MessageTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            MessageTemplate::Help => "help.txt",
            MessageTemplate::LeaderboardCreated => "created.txt",
            MessageTemplate::LeaderboardList => "list.txt",
            MessageTemplate::ScoreSubmitted => "submitted.txt",
            MessageTemplate::Rankings => "rankings.txt",
            MessageTemplate::UserRank => "user_rank.txt",
            MessageTemplate::Rebuilt => "rebuilt.txt",
            MessageTemplate::Stats => "stats.txt",
            MessageTemplate::Deleted => "deleted.txt",
            MessageTemplate::CacheCleared => "cleared.txt",
            MessageTemplate::UserEvicted => "evicted.txt",
            MessageTemplate::Health => "health.txt",
        }
    }

    pub fn get(&self) -> RankResult<Template<'static, 'static>> {
        Ok(TEMPLATES_ENVIRONMENT.get_template(self.name())?)
    }

    pub fn render<S: serde::Serialize>(&self, ctx: S) -> RankResult<String> {
        Ok(self.get()?.render(ctx)?)
    }

    pub fn template(&self) -> &'static str {
        // \n\ at each code line end creates a line break at the proper position and discards further spaces in this line of code.
        // \x20 is an ASCII space, used to keep the indentation of the first space of a line.
        match self {
            MessageTemplate::Help => {
                "Leaderboard console commands:\n\
                \x20 !create <game> <type> <order> <name...>   type: global|daily|weekly|monthly|season, order: asc|desc\n\
                \x20 !list [game]                             active leaderboards, newest first\n\
                \x20 !submit <leaderboard> <user> <score>     record a score, shows the rank movement\n\
                \x20 !top <leaderboard> [limit] [offset]      top rankings, limit defaults to 10\n\
                \x20 !rank <leaderboard> <user>               current rank of a user\n\
                \x20 !around <leaderboard> <user> [count]     rankings around a user, count defaults to 10\n\
                \x20 !rebuild <leaderboard>                   regenerate the ranking cache from the score history\n\
                \x20 !stats <leaderboard>                     score figures over the latest score of every user\n\
                \x20 !delete <leaderboard>                    deactivate a leaderboard\n\
                \x20 !evict <leaderboard> <user>              drop a user from the ranking cache only\n\
                \x20 !clear <leaderboard>                     drop every cached entry of a leaderboard\n\
                \x20 !health                                  readiness of every dependency"
            }
            MessageTemplate::LeaderboardCreated => {
                "Leaderboard *{{ leaderboard.name }}* created with id `{{ leaderboard.id }}` \
                ({{ leaderboard.kind }}, {{ leaderboard.sort_order }}, up to {{ leaderboard.max_entries }} entries)."
            }
            MessageTemplate::LeaderboardList => {
                "{{ total }} active leaderboard{{ 's' if total != 1 }}\
                {%- if table %}:\n{{ table }}{% else %}.{% endif %}"
            }
            MessageTemplate::ScoreSubmitted => {
                "{{ snapshot.user_id }} scored {{ snapshot.score }} \
                {%- if snapshot.previous_score %} (was {{ snapshot.previous_score }}){% endif %}, \
                {%- if snapshot.rank %} now ranked #{{ snapshot.rank }}{% else %} not ranked yet{% endif %}\
                {%- if snapshot.rank_delta > 0 %} (up {{ snapshot.rank_delta }})\
                {%- elif snapshot.rank_delta < 0 %} (down {{ -snapshot.rank_delta }}){% endif %}."
            }
            MessageTemplate::Rankings => {
                "{%- if table -%}\
                Rankings for `{{ leaderboard_id }}`:\n{{ table }}\
                {%- else -%}\
                No rankings for `{{ leaderboard_id }}`.\
                {%- endif -%}"
            }
            MessageTemplate::UserRank => {
                "{{ rank.user_id }} is ranked #{{ rank.rank }} of {{ rank.total_users }} with {{ rank.score }}."
            }
            MessageTemplate::Rebuilt => {
                "Ranking cache of `{{ leaderboard_id }}` rebuilt with {{ count }} entr{{ 'ies' if count != 1 else 'y' }}."
            }
            MessageTemplate::Stats => {
                "Stats for `{{ stats.leaderboard_id }}`:\n\
                \x20 users: {{ stats.total_users }}, score records: {{ stats.total_scores }}\n\
                {%- if stats.highest_score is not none %}\n\
                \x20 highest: {{ stats.highest_score }}, lowest: {{ stats.lowest_score }}, average: {{ average }}\
                {%- endif %}"
            }
            MessageTemplate::Deleted => "Leaderboard `{{ leaderboard_id }}` deleted.",
            MessageTemplate::CacheCleared => "Caches of `{{ leaderboard_id }}` cleared.",
            MessageTemplate::UserEvicted => {
                "{%- if removed -%}\
                {{ user_id }} evicted from the ranking cache of `{{ leaderboard_id }}`.\
                {%- else -%}\
                {{ user_id }} was not cached for `{{ leaderboard_id }}`.\
                {%- endif -%}"
            }
            MessageTemplate::Health => {
                "Status: {{ 'ok' if report.healthy else 'error' }} (up {{ report.uptime_secs }}s)\
                {%- for check in report.checks %}\n\
                \x20 {{ check.dependency }}: {{ 'ok' if check.healthy else 'error' }}\
                {%- if check.error %} ({{ check.error }}){% endif %}\
                {%- endfor %}"
            }
        }
    }
}
