mod api;
mod database;
mod daterange;
mod debounce;
mod export;
mod outbound;
mod settings;
mod web;

use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use crate::api::Clock;
use crate::database::Database;
use crate::outbound::chat::{ChatApi, ChatClient};
use crate::outbound::{AdminApi, AdminClient};
use crate::settings::{Args, Settings};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = match Settings::from_file(&args.config) {
        Ok(settings) => settings,
        Err(error) => {
            error!("failed to load configuration: {error}");
            exit(1);
        }
    };

    let database = match Database::connect(&settings.storage.path) {
        Ok(database) => database,
        Err(error) => {
            error!("failed to open storage: {error:#}");
            exit(1);
        }
    };

    let admin = match AdminClient::new(&settings.shopify) {
        Ok(client) => client,
        Err(error) => {
            error!("failed to build the admin client: {error:#}");
            exit(1);
        }
    };

    let chat = match ChatClient::new(&settings.chat) {
        Ok(client) => client,
        Err(error) => {
            error!("failed to build the chat client: {error:#}");
            exit(1);
        }
    };

    let schema = api::schema(
        database,
        Arc::new(admin) as Arc<dyn AdminApi>,
        Arc::new(chat) as Arc<dyn ChatApi>,
        settings.shopify.shop.clone(),
        Clock::system(),
    );

    info!(shop = %settings.shopify.shop, "customer dashboard server ready");
    web::serve(schema, settings.web.address).await;
}
