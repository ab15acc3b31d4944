use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use tracing::info;

use crate::atlas::Atlas;
use crate::cli::{Cli, ServeArgs};
use crate::http;

pub fn serve(_cli: &Cli, args: &ServeArgs) -> Result<()> {
    let atlas = Atlas::load(&args.data, &args.polling_places)?;
    info!(districts = atlas.district_count(), "atlas ready");
    actix_web::rt::System::new().block_on(run(atlas, &args.bind))
}

async fn run(atlas: Atlas, bind: &str) -> Result<()> {
    let data = web::Data::new(atlas);
    info!(%bind, "starting HTTP server");
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("X-Content-Type-Options", "nosniff"))
                    // NOTE: to debug the API directly in the browser, remove this header.
                    .add(("Content-Disposition", "attachment")),
            )
            .configure(http::configure)
    })
    .bind(bind)
    .with_context(|| format!("Failed to bind {bind}"))?
    .run()
    .await
    .context("HTTP server terminated")
}
