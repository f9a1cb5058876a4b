use crate::{
    core::{
        display,
        leaderboard::{LeaderboardType, NewLeaderboard, ScoreSubmission, SortOrder},
        ranking::RankingService,
        templates::MessageTemplate,
    },
    error::{RankError, RankResult},
};

use minijinja::context;
use once_cell::sync::Lazy;
use regex::Regex;

const COMMANDS: [&str; 13] = [
    "!help", "!create", "!list", "!submit", "!top", "!rank", "!around", "!rebuild", "!stats",
    "!delete", "!evict", "!clear", "!health",
];
const DEFAULT_PAGE: usize = 10;
// Whitespace separated tokens; scores may be signed so that validation can reject them
static REGEX_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Create(NewLeaderboard),
    List(Option<String>),
    Submit(ScoreSubmission),
    Top {
        leaderboard_id: String,
        limit: usize,
        offset: usize,
    },
    Rank {
        leaderboard_id: String,
        user_id: String,
    },
    Around {
        leaderboard_id: String,
        user_id: String,
        count: usize,
    },
    Rebuild(String),
    Stats(String),
    Delete(String),
    Evict {
        leaderboard_id: String,
        user_id: String,
    },
    Clear(String),
    Health,
}

impl Command {
    pub fn is_command(input: &str) -> bool {
        REGEX_TOKENS
            .find_iter(input)
            .next()
            .map(|mat| COMMANDS.contains(&mat.as_str()))
            .unwrap_or_default()
    }

    /// Parses a console line. Callers check `is_command` first; arguments that are missing or
    /// malformed are reported as validation errors.
    pub fn build_from(input: &str) -> RankResult<Command> {
        let mut tokens = REGEX_TOKENS.find_iter(input).map(|mat| mat.as_str());
        let start_with = tokens.next().unwrap_or_default();
        let mut arg = |name: &str| {
            tokens
                .next()
                .map(str::to_string)
                .ok_or_else(|| RankError::Validation(format!("Missing <{name}>, see !help")))
        };

        let command = match start_with {
            "!help" => Command::Help,
            "!create" => {
                let game_id = arg("game")?;
                let kind = LeaderboardType::parse(&arg("type")?)?;
                let sort_order = SortOrder::parse(&arg("order")?)?;
                let name = arg("name")?;
                let rest = tokens.collect::<Vec<_>>();
                let name = match rest.is_empty() {
                    true => name,
                    false => format!("{name} {}", rest.join(" ")),
                };
                Command::Create(NewLeaderboard::new(&name, &game_id, kind, sort_order))
            }
            "!list" => Command::List(tokens.next().map(str::to_string)),
            "!submit" => {
                let leaderboard_id = arg("leaderboard")?;
                let user_id = arg("user")?;
                let score = parse_number::<i64>("score", &arg("score")?)?;
                Command::Submit(ScoreSubmission::new(&leaderboard_id, &user_id, score))
            }
            "!top" => {
                let leaderboard_id = arg("leaderboard")?;
                let limit = optional_number("limit", tokens.next())?.unwrap_or(DEFAULT_PAGE);
                let offset = optional_number("offset", tokens.next())?.unwrap_or(0);
                Command::Top {
                    leaderboard_id,
                    limit,
                    offset,
                }
            }
            "!rank" => Command::Rank {
                leaderboard_id: arg("leaderboard")?,
                user_id: arg("user")?,
            },
            "!around" => {
                let leaderboard_id = arg("leaderboard")?;
                let user_id = arg("user")?;
                let count = optional_number("count", tokens.next())?.unwrap_or(DEFAULT_PAGE);
                Command::Around {
                    leaderboard_id,
                    user_id,
                    count,
                }
            }
            "!rebuild" => Command::Rebuild(arg("leaderboard")?),
            "!stats" => Command::Stats(arg("leaderboard")?),
            "!delete" => Command::Delete(arg("leaderboard")?),
            "!evict" => Command::Evict {
                leaderboard_id: arg("leaderboard")?,
                user_id: arg("user")?,
            },
            "!clear" => Command::Clear(arg("leaderboard")?),
            "!health" => Command::Health,
            other => {
                return Err(RankError::Validation(format!(
                    "Unknown command '{other}', see !help"
                )))
            }
        };
        Ok(command)
    }

    /// Runs the command against the service and renders the reply.
    pub async fn execute(self, service: &RankingService) -> RankResult<String> {
        match self {
            Command::Help => MessageTemplate::Help.render(context! {}),
            Command::Create(request) => {
                let leaderboard = service.create_leaderboard(request).await?;
                MessageTemplate::LeaderboardCreated.render(context! { leaderboard })
            }
            Command::List(game_id) => {
                let (leaderboards, total) =
                    service.list_leaderboards(game_id.as_deref(), 0, 0).await?;
                MessageTemplate::LeaderboardList.render(context! {
                    total,
                    table => display::leaderboards(&leaderboards),
                })
            }
            Command::Submit(submission) => {
                let snapshot = service.submit_score(submission).await?;
                MessageTemplate::ScoreSubmitted.render(context! { snapshot })
            }
            Command::Top {
                leaderboard_id,
                limit,
                offset,
            } => {
                let rankings = service.top_rankings(&leaderboard_id, limit, offset).await?;
                MessageTemplate::Rankings.render(context! {
                    leaderboard_id,
                    table => display::rankings(&rankings),
                })
            }
            Command::Rank {
                leaderboard_id,
                user_id,
            } => {
                let rank = service.user_rank(&leaderboard_id, &user_id).await?;
                MessageTemplate::UserRank.render(context! { rank })
            }
            Command::Around {
                leaderboard_id,
                user_id,
                count,
            } => {
                let rankings = service
                    .rankings_around_user(&leaderboard_id, &user_id, count)
                    .await?;
                MessageTemplate::Rankings.render(context! {
                    leaderboard_id,
                    table => display::rankings(&rankings),
                })
            }
            Command::Rebuild(leaderboard_id) => {
                let count = service.rebuild(&leaderboard_id).await?;
                MessageTemplate::Rebuilt.render(context! { leaderboard_id, count })
            }
            Command::Stats(leaderboard_id) => {
                let stats = service.stats(&leaderboard_id).await?;
                let average = stats
                    .average_score
                    .map(|avg| format!("{avg:.2}"))
                    .unwrap_or_default();
                MessageTemplate::Stats.render(context! { stats, average })
            }
            Command::Delete(leaderboard_id) => {
                service.delete_leaderboard(&leaderboard_id).await?;
                MessageTemplate::Deleted.render(context! { leaderboard_id })
            }
            Command::Evict {
                leaderboard_id,
                user_id,
            } => {
                let removed = service.evict_cached_user(&leaderboard_id, &user_id).await?;
                MessageTemplate::UserEvicted.render(context! { leaderboard_id, user_id, removed })
            }
            Command::Clear(leaderboard_id) => {
                service.clear_cache(&leaderboard_id).await?;
                MessageTemplate::CacheCleared.render(context! { leaderboard_id })
            }
            Command::Health => {
                let report = service.health().await;
                MessageTemplate::Health.render(context! { report })
            }
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, token: &str) -> RankResult<T> {
    token
        .parse::<T>()
        .map_err(|_| RankError::Validation(format!("<{name}> must be a number, got '{token}'")))
}

fn optional_number<T: std::str::FromStr>(name: &str, token: Option<&str>) -> RankResult<Option<T>> {
    token.map(|token| parse_number(name, token)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn recognizes_commands() {
        assert!(Command::is_command("!top lb 5"));
        assert!(Command::is_command("  !help"));
        assert!(Command::is_command("!health"));
        assert!(!Command::is_command("top lb"));
        assert!(!Command::is_command("!unknown"));
        assert!(!Command::is_command(""));
    }

    #[test]
    fn create_joins_the_name() {
        let command = Command::build_from("!create pacman weekly desc Arcade Masters").unwrap();
        let expected = NewLeaderboard::new(
            "Arcade Masters",
            "pacman",
            LeaderboardType::Weekly,
            SortOrder::Descending,
        );
        assert_eq!(command, Command::Create(expected));
    }

    #[test]
    fn optional_arguments_have_defaults() {
        assert_eq!(
            Command::build_from("!top lb").unwrap(),
            Command::Top {
                leaderboard_id: "lb".to_string(),
                limit: 10,
                offset: 0
            }
        );
        assert_eq!(
            Command::build_from("!around lb u1 4").unwrap(),
            Command::Around {
                leaderboard_id: "lb".to_string(),
                user_id: "u1".to_string(),
                count: 4
            }
        );
    }

    #[test]
    fn malformed_arguments_are_validation_errors() {
        assert!(matches!(
            Command::build_from("!submit lb u1"),
            Err(RankError::Validation(_))
        ));
        assert!(matches!(
            Command::build_from("!submit lb u1 lots"),
            Err(RankError::Validation(_))
        ));
        assert!(matches!(
            Command::build_from("!create pacman yearly desc Arcade"),
            Err(RankError::Validation(_))
        ));
        // parsed, rejected later by submission validation
        assert!(Command::build_from("!submit lb u1 -5").is_ok());
    }

    #[tokio::test]
    async fn console_session() {
        let service = RankingService::in_memory(Settings::default());
        let created = Command::build_from("!create pacman global desc Arcade")
            .unwrap()
            .execute(&service)
            .await
            .unwrap();
        assert!(created.contains("Arcade"));

        let (leaderboards, _) = service.list_leaderboards(None, 0, 0).await.unwrap();
        let id = leaderboards[0].id.clone();
        for line in [format!("!submit {id} u1 100"), format!("!submit {id} u2 200")] {
            Command::build_from(&line)
                .unwrap()
                .execute(&service)
                .await
                .unwrap();
        }

        let top = Command::build_from(&format!("!top {id}"))
            .unwrap()
            .execute(&service)
            .await
            .unwrap();
        assert!(top.contains("1) u2 200"));
        assert!(top.contains("2) u1 100"));

        let rank = Command::build_from(&format!("!rank {id} u1"))
            .unwrap()
            .execute(&service)
            .await
            .unwrap();
        assert_eq!(rank, "u1 is ranked #2 of 2 with 100.");
    }
}
