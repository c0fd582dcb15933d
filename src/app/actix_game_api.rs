use crate::{
    Result,
    app::{
        Command,
        GameApi,
    },
    mirror::transport::Address,
    model::{
        EngineError,
        Rejection,
    },
};
use actix_web::{
    App,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    error::{
        ErrorBadRequest,
        ErrorInternalServerError,
    },
    web,
};
use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    thread::JoinHandle,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorDto {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    wallet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    week: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WalletRequest {
    wallet: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OverloadRequest {
    wallet: String,
    /// Hex address of a wallet that wants to pay the network fee itself.
    cosigner: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfirmRequest {
    week_start: i64,
    mirror_total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PaidActionRequest {
    wallet: String,
    signature: String,
}

/// HTTP front door. Every route forwards a [`Command`] into the app loop
/// and waits on a oneshot for the answer.
pub struct ActixGameApi {
    receiver: mpsc::Receiver<Command>,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ActixGameApi {
    pub async fn new(port: Option<u16>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(64);

        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for game API")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("game API listening on {}", base_url);

        let server_sender = sender.clone();
        let server = HttpServer::new(move || {
            let sender = server_sender.clone();

            App::new()
                .app_data(web::Data::new(sender))
                .route("/boss", web::get().to(handle_status))
                .route("/boss/spawn", web::post().to(handle_spawn))
                .route("/boss/join", web::post().to(handle_join))
                .route("/boss/overload", web::post().to(handle_overload))
                .route(
                    "/boss/overload/confirm",
                    web::post().to(handle_confirm_cosigned),
                )
                .route("/boss/reconnect", web::post().to(handle_reconnect))
                .route(
                    "/boss/overload-amplifier",
                    web::post().to(handle_amplifier),
                )
                .route("/boss/raid-license", web::post().to(handle_raid_license))
                .route("/boss/results", web::get().to(handle_results))
                .route("/boss/mirror", web::get().to(handle_mirror))
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            receiver,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl GameApi for ActixGameApi {
    async fn next_command(&mut self) -> Result<Command> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| anyhow!("game API server closed"))
    }
}

impl Drop for ActixGameApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

fn engine_error_response(error: EngineError) -> HttpResponse {
    match error {
        EngineError::Rejected(rejection) => {
            let dto = ErrorDto {
                code: rejection.code().to_string(),
                message: None,
            };
            match rejection {
                Rejection::BossNotSpawned => HttpResponse::NotFound().json(dto),
                _ => HttpResponse::Conflict().json(dto),
            }
        }
        EngineError::Payment(reason) => HttpResponse::PaymentRequired().json(ErrorDto {
            code: "PAYMENT_FAILED".to_string(),
            message: Some(reason),
        }),
        EngineError::Internal(source) => {
            tracing::error!("request failed internally: {source:#}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn forward<T>(
    sender: &web::Data<mpsc::Sender<Command>>,
    command: Command,
    receiver: oneshot::Receiver<T>,
) -> actix_web::Result<T> {
    sender
        .get_ref()
        .clone()
        .send(command)
        .await
        .map_err(|_| ErrorInternalServerError("unable to forward command"))?;
    receiver
        .await
        .map_err(|_| ErrorInternalServerError("command responder dropped"))
}

async fn handle_status(
    sender: web::Data<mpsc::Sender<Command>>,
    query: web::Query<StatusQuery>,
) -> actix_web::Result<HttpResponse> {
    let (respond, receiver) = oneshot::channel();
    let command = Command::Status {
        wallet: query.into_inner().wallet,
        respond,
    };
    let result = forward(&sender, command, receiver).await?;
    Ok(match result {
        Ok(status) => HttpResponse::Ok().json(status),
        // No boss this week is a normal answer, not an error.
        Err(EngineError::Rejected(Rejection::BossNotSpawned)) => {
            HttpResponse::Ok().json(serde_json::json!({ "boss": null }))
        }
        Err(error) => engine_error_response(error),
    })
}

async fn handle_spawn(
    sender: web::Data<mpsc::Sender<Command>>,
) -> actix_web::Result<HttpResponse> {
    let (respond, receiver) = oneshot::channel();
    let result = forward(&sender, Command::Spawn { respond }, receiver).await?;
    Ok(match result {
        Ok(boss) => HttpResponse::Ok().json(boss),
        Err(error) => engine_error_response(error),
    })
}

async fn handle_join(
    sender: web::Data<mpsc::Sender<Command>>,
    request: web::Json<WalletRequest>,
) -> actix_web::Result<HttpResponse> {
    let (respond, receiver) = oneshot::channel();
    let command = Command::Join {
        wallet: request.into_inner().wallet,
        respond,
    };
    let result = forward(&sender, command, receiver).await?;
    Ok(match result {
        Ok(participant) => HttpResponse::Ok().json(participant),
        Err(error) => engine_error_response(error),
    })
}

async fn handle_overload(
    sender: web::Data<mpsc::Sender<Command>>,
    request: web::Json<OverloadRequest>,
) -> actix_web::Result<HttpResponse> {
    let request = request.into_inner();
    let cosigner = request
        .cosigner
        .map(|raw| Address::from_hex(&raw))
        .transpose()
        .map_err(|_| ErrorBadRequest("invalid cosigner address"))?;
    let (respond, receiver) = oneshot::channel();
    let command = Command::Overload {
        wallet: request.wallet,
        cosigner,
        respond,
    };
    let result = forward(&sender, command, receiver).await?;
    Ok(match result {
        Ok(reply) => HttpResponse::Ok().json(reply),
        Err(error) => engine_error_response(error),
    })
}

async fn handle_confirm_cosigned(
    sender: web::Data<mpsc::Sender<Command>>,
    request: web::Json<ConfirmRequest>,
) -> actix_web::Result<HttpResponse> {
    let request = request.into_inner();
    let (respond, receiver) = oneshot::channel();
    let command = Command::ConfirmCosignedPush {
        week_start: request.week_start,
        mirror_total: request.mirror_total,
        respond,
    };
    forward(&sender, command, receiver).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn handle_reconnect(
    sender: web::Data<mpsc::Sender<Command>>,
    request: web::Json<PaidActionRequest>,
) -> actix_web::Result<HttpResponse> {
    let request = request.into_inner();
    let (respond, receiver) = oneshot::channel();
    let command = Command::Reconnect {
        wallet: request.wallet,
        signature: request.signature,
        respond,
    };
    let result = forward(&sender, command, receiver).await?;
    Ok(match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => engine_error_response(error),
    })
}

async fn handle_amplifier(
    sender: web::Data<mpsc::Sender<Command>>,
    request: web::Json<PaidActionRequest>,
) -> actix_web::Result<HttpResponse> {
    let request = request.into_inner();
    let (respond, receiver) = oneshot::channel();
    let command = Command::PurchaseAmplifier {
        wallet: request.wallet,
        signature: request.signature,
        respond,
    };
    let result = forward(&sender, command, receiver).await?;
    Ok(match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => engine_error_response(error),
    })
}

async fn handle_raid_license(
    sender: web::Data<mpsc::Sender<Command>>,
    request: web::Json<PaidActionRequest>,
) -> actix_web::Result<HttpResponse> {
    let request = request.into_inner();
    let (respond, receiver) = oneshot::channel();
    let command = Command::PurchaseRaidLicense {
        wallet: request.wallet,
        signature: request.signature,
        respond,
    };
    let result = forward(&sender, command, receiver).await?;
    Ok(match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => engine_error_response(error),
    })
}

async fn handle_results(
    sender: web::Data<mpsc::Sender<Command>>,
    query: web::Query<ResultsQuery>,
) -> actix_web::Result<HttpResponse> {
    let (respond, receiver) = oneshot::channel();
    let command = Command::Resolve {
        week_start: query.into_inner().week,
        respond,
    };
    let result = forward(&sender, command, receiver).await?;
    Ok(match result {
        Ok(resolution) => HttpResponse::Ok().json(resolution),
        Err(error) => engine_error_response(error),
    })
}

async fn handle_mirror(
    sender: web::Data<mpsc::Sender<Command>>,
) -> actix_web::Result<HttpResponse> {
    let (respond, receiver) = oneshot::channel();
    let result = forward(&sender, Command::MirrorView { respond }, receiver).await?;
    Ok(match result {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => HttpResponse::NotFound().finish(),
    })
}
