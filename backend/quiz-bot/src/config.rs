use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEFAULT_WELCOME_IMAGE: &str = "https://media.giphy.com/media/DwXOS8RqHocEM/200w_d.gif";
const DEFAULT_GAME_OVER_IMAGE: &str = "https://media.giphy.com/media/g9582DNuQppxC/200w_d.gif";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub bot: BotConfig,
    pub quiz: QuizConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub typing_delay_ms: u64,
    pub startup_delay_ms: u64,
    pub welcome_image: String,
    pub game_over_image: String,
    pub event_buffer: usize,
}

impl BotConfig {
    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizConfig {
    /// Remote quiz/judge service. Unset means the built-in generator.
    pub api_url: Option<String>,
    pub question_count: usize,
    pub answer_count: u32,
    pub fetch_latency_max_ms: u64,
    pub judge_latency_max_ms: u64,
    pub rejection_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            bot: BotConfig {
                typing_delay_ms: 1000,
                startup_delay_ms: 400,
                welcome_image: DEFAULT_WELCOME_IMAGE.to_string(),
                game_over_image: DEFAULT_GAME_OVER_IMAGE.to_string(),
                event_buffer: 256,
            },
            quiz: QuizConfig {
                api_url: None,
                question_count: 8,
                answer_count: 4,
                fetch_latency_max_ms: 3000,
                judge_latency_max_ms: 8000,
                rejection_rate: 0.1,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (e.g. APP__BOT__TYPING_DELAY_MS)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let bot = BotConfig {
            typing_delay_ms: settings
                .get::<u64>("bot.typing_delay_ms")
                .unwrap_or(defaults.bot.typing_delay_ms),
            startup_delay_ms: settings
                .get::<u64>("bot.startup_delay_ms")
                .unwrap_or(defaults.bot.startup_delay_ms),
            welcome_image: settings
                .get_string("bot.welcome_image")
                .unwrap_or(defaults.bot.welcome_image),
            game_over_image: settings
                .get_string("bot.game_over_image")
                .unwrap_or(defaults.bot.game_over_image),
            event_buffer: settings
                .get::<usize>("bot.event_buffer")
                .unwrap_or(defaults.bot.event_buffer),
        };

        let api_url = settings
            .get_string("quiz.api_url")
            .or_else(|_| env::var("QUIZ_API_URL"))
            .ok()
            .filter(|url| !url.trim().is_empty());

        let rejection_rate = settings
            .get::<f64>("quiz.rejection_rate")
            .unwrap_or(defaults.quiz.rejection_rate);
        if !(0.0..=1.0).contains(&rejection_rate) {
            return Err(config::ConfigError::Message(format!(
                "quiz.rejection_rate must be within 0..=1, got {}",
                rejection_rate
            )));
        }

        let quiz = QuizConfig {
            api_url,
            question_count: settings
                .get::<usize>("quiz.question_count")
                .unwrap_or(defaults.quiz.question_count),
            answer_count: settings
                .get::<u32>("quiz.answer_count")
                .unwrap_or(defaults.quiz.answer_count)
                .max(1),
            fetch_latency_max_ms: settings
                .get::<u64>("quiz.fetch_latency_max_ms")
                .unwrap_or(defaults.quiz.fetch_latency_max_ms),
            judge_latency_max_ms: settings
                .get::<u64>("quiz.judge_latency_max_ms")
                .unwrap_or(defaults.quiz.judge_latency_max_ms),
            rejection_rate,
        };

        Ok(Config {
            bind_addr,
            bot,
            quiz,
        })
    }
}
