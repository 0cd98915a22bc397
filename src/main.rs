mod analytics;
mod config;
mod error;
mod quiz;
mod telegram;

use std::{net::SocketAddr, sync::Arc};

use dotenv::dotenv;
use log::{debug, error, info};
use rand::{distributions::Alphanumeric, Rng};
use teloxide::{
    prelude::*,
    update_listeners::webhooks,
    utils::command::BotCommands,
};

use analytics::HttpReporter;
use config::Config;
use error::StartupError;
use quiz::{
    content::Content,
    deck::{DeckMode, DeckSelector},
    engine::QuizEngine,
    router,
    session::SessionStore,
    Event,
};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
enum ChatCommand {
    #[command(description = "open the welcome screen.")]
    Start,
    #[command(description = "show your Telegram id.")]
    Whoami,
    #[command(description = "show usage counters (admin only).")]
    Stats,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();

    if let Err(err) = run().await {
        error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    info!("Starting quiz bot...");
    let config = Arc::new(Config::from_env()?);

    let content_path = Content::locate(&config.content_paths)?;
    let content = Arc::new(Content::load(&content_path)?);

    let mode = if config.debug_mode {
        DeckMode::Debug {
            index: config.debug_deck_index,
        }
    } else {
        DeckMode::Random
    };
    let decks = DeckSelector::new(mode);
    decks.check(&content)?;
    info!("Deck mode: {:?}", mode);

    let reporter = Arc::new(HttpReporter::new(
        config.analytics_url.clone(),
        config.analytics_token.clone(),
    ));
    if !reporter.is_enabled() {
        info!("Analytics endpoint is not configured, only local counters are kept");
    }

    let engine = Arc::new(QuizEngine::new(
        content,
        decks,
        Arc::new(SessionStore::new()),
        reporter.clone(),
    ));

    let bot = Bot::new(config.bot_token.clone());

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<ChatCommand>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![engine, reporter, config.clone()])
        .enable_ctrlc_handler()
        .build();

    match &config.webhook_url {
        Some(base) => {
            let secret: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(32)
                .map(char::from)
                .collect();
            let url = format!("{}/tg/{}", base, secret).parse()?;
            let address = SocketAddr::from(([0, 0, 0, 0], config.port));
            info!("Listening for webhooks on {} (public base {})", address, base);

            let listener = webhooks::axum(bot, webhooks::Options::new(address, url)).await?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await;
        }
        None => {
            info!("WEBHOOK_URL is empty, using long-polling");
            dispatcher.dispatch().await;
        }
    }
    Ok(())
}

async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: ChatCommand,
    engine: Arc<QuizEngine>,
    reporter: Arc<HttpReporter>,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0;

    match cmd {
        ChatCommand::Start => {
            let renders = engine.handle(user_id, Event::Start).await;
            telegram::deliver(&bot, msg.chat.id, renders).await?;
        }
        ChatCommand::Whoami => {
            bot.send_message(msg.chat.id, format!("Your Telegram ID: {}", user_id))
                .await?;
        }
        ChatCommand::Stats => {
            if !config.is_admin(user_id) {
                debug!("User {} asked for stats without being the admin", user_id);
                return Ok(());
            }
            bot.send_message(msg.chat.id, reporter.stats().to_string())
                .await?;
        }
    }
    Ok(())
}

async fn message_handler(bot: Bot, msg: Message, engine: Arc<QuizEngine>) -> HandlerResult {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };
    debug!(">> text: {:?}", text);

    let renders = engine.handle(user.id.0, Event::Text(text.to_string())).await;
    telegram::deliver(&bot, msg.chat.id, renders).await?;
    Ok(())
}

async fn callback_handler(bot: Bot, q: CallbackQuery, engine: Arc<QuizEngine>) -> HandlerResult {
    // Stops the loading spinner on the button, nothing else depends on it
    if let Err(err) = bot.answer_callback_query(q.id.clone()).await {
        debug!("Failed to acknowledge callback: {}", err);
    }

    let Some(event) = q.data.as_deref().and_then(router::decode) else {
        debug!("Ignoring callback data {:?}", q.data);
        return Ok(());
    };
    let chat = match &q.message {
        Some(message) => message.chat.id,
        None => ChatId(q.from.id.0 as i64),
    };

    let renders = engine.handle(q.from.id.0, event).await;
    telegram::deliver(&bot, chat, renders).await?;
    Ok(())
}
