use std::error::Error;
use std::sync::Arc;

use warp::Filter;

use futures::future::FutureExt;
use log::{info, initialize_logger};
use oficinas_backend::audit::PgAuditSink;
use oficinas_backend::config::{get_variable, get_variable_or};
use oficinas_backend::db::PgDb;
use oficinas_backend::documents;
use oficinas_backend::environment::{Config, Environment};
use oficinas_backend::routes;
use oficinas_backend::store::S3Store;
use oficinas_backend::urls::Urls;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let store = Arc::new(S3Store::from_env().expect("initialize S3 store from environment"));

    let main_port: u16 = get_variable("BACKEND_PORT")
        .parse()
        .expect("parse BACKEND_PORT as u16");
    let admin_port: u16 = get_variable("BACKEND_ADMIN_PORT")
        .parse()
        .expect("parse BACKEND_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
    let pool: sqlx::PgPool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from BACKEND_DB_CONNECTION_STRING");

    let config = Config::new(
        get_variable_or("BACKEND_MINIMUM_ATTENDANCE_PERCENT", "75.0")
            .parse()
            .expect("parse BACKEND_MINIMUM_ATTENDANCE_PERCENT as f64"),
    );

    let db = Arc::new(PgDb::new(pool.clone(), config));
    let audit = Arc::new(PgAuditSink::new(pool));

    let urls = Arc::new(Urls::new(
        get_variable("BACKEND_BASE_URL"),
        get_variable("BACKEND_CERTIFICATES_PATH"),
        get_variable("BACKEND_DOCUMENT_FALLBACK_URL"),
    ));

    let renderer = Arc::new(documents::make_text_renderer());

    let environment = Environment::new(
        logger.clone(),
        db,
        urls,
        store,
        renderer,
        audit,
        config,
    );

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            let termination_sender = termination_sender.clone();
            termination_sender.send(()).await.unwrap();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            let terminate = terminate.clone();

            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let logger2 = logger.clone();

        let learner_routes = routes::make_learner_routes(environment.clone());
        let tutor_routes = routes::make_tutor_routes(environment.clone());
        let workshop_routes = routes::make_workshop_routes(environment.clone());
        let enrollment_routes = routes::make_enrollment_routes(environment.clone());
        let attendance_routes = routes::make_attendance_routes(environment.clone());
        let certificate_routes = routes::make_certificate_routes(environment.clone());

        let routes = learner_routes
            .or(tutor_routes)
            .or(workshop_routes)
            .or(enrollment_routes)
            .or(attendance_routes)
            .or(certificate_routes)
            .recover(move |r| routes::format_rejection(logger2.clone(), r));

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
