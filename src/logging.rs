use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter};
use crate::settings::logging::{LogFormat, LogOutput};
use crate::settings::LogSettings;

/// 로깅을 초기화합니다.
///
/// 파일 출력일 때 반환되는 가드는 프로그램이 끝날 때까지 유지해야 합니다.
pub fn init_logging(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(settings.level).into())
        .from_env_lossy();

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::File(path) => {
            let path = Path::new(path);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "gateway.log".into());
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
        }
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_timer(UtcTime::new(Rfc3339))
        .with_target(true)
        .with_ansi(matches!(settings.output, LogOutput::Stdout));

    let result = match settings.format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("로깅 초기화 실패: {}", e);
        return None;
    }
    Some(guard)
}

/// 요청 한 건의 처리 기록
#[derive(Debug)]
pub struct RequestLog {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub service: Option<String>,
    pub user: Option<String>,
    pub status_code: u16,
    pub duration_ms: u64,
    pub error: Option<String>,
    started: Instant,
}

impl RequestLog {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            method: String::new(),
            path: String::new(),
            service: None,
            user: None,
            status_code: 0,
            duration_ms: 0,
            error: None,
            started: Instant::now(),
        }
    }

    pub fn with_request<B>(&mut self, req: &hyper::Request<B>) {
        self.method = req.method().to_string();
        self.path = req.uri().path().to_string();
    }

    pub fn with_service(&mut self, name: &str) {
        self.service = Some(name.to_string());
    }

    pub fn with_user(&mut self, user: Option<&str>) {
        self.user = user.map(str::to_string);
    }

    pub fn with_response(&mut self, status: hyper::StatusCode) {
        self.status_code = status.as_u16();
        self.duration_ms = self.started.elapsed().as_millis() as u64;
    }

    pub fn with_error(&mut self, error: impl std::fmt::Display) {
        self.error = Some(error.to_string());
    }

    pub fn level(&self) -> Level {
        if self.error.is_some() || self.status_code >= 500 {
            Level::ERROR
        } else if self.status_code >= 400 {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

pub fn log_request(log: &RequestLog) {
    match log.level() {
        Level::ERROR => error!(
            request_id = %log.request_id,
            method = %log.method,
            path = %log.path,
            service = ?log.service,
            user = ?log.user,
            status = log.status_code,
            duration_ms = log.duration_ms,
            error = ?log.error,
            "요청 실패"
        ),
        Level::WARN => warn!(
            request_id = %log.request_id,
            method = %log.method,
            path = %log.path,
            service = ?log.service,
            user = ?log.user,
            status = log.status_code,
            duration_ms = log.duration_ms,
            "요청 거부"
        ),
        _ => info!(
            request_id = %log.request_id,
            method = %log.method,
            path = %log.path,
            service = ?log.service,
            user = ?log.user,
            status = log.status_code,
            duration_ms = log.duration_ms,
            "요청 완료"
        ),
    }
}
