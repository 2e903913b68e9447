//! PDF export of stored reports
//!
//! The whole document is built before the response starts, so a layout
//! failure can still be reported as a JSON 500. Only serialisation happens
//! while the body streams; an error there ends the stream.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use hazard_report_shared::api::{ErrorResponse, ExportRequest};
use hazard_report_shared::error::HazardError;
use hazard_report_shared::report::Report;
use lopdf::Document;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::error::WebError;
use crate::pdf::{Font, PdfCanvas, PdfImage, TextStyle, GRAY, LINK_BLUE};
use crate::reports::json_body;
use crate::repository::Repository;
use crate::SharedState;

pub const IMAGE_BOX_WIDTH: f32 = 450.0;
pub const IMAGE_BOX_HEIGHT: f32 = 300.0;
/// Footer sits this far above the bottom edge.
pub const FOOTER_OFFSET: f32 = 40.0;
pub const EXPORT_FILENAME: &str = "reports.pdf";

const STREAM_CHUNK: usize = 64 * 1024;
const STREAM_BUFFER_CHUNKS: usize = 4;

/// Bytes read from disk ahead of the render.
#[derive(Debug, Default)]
pub struct ExportAssets {
    pub logo: Option<Vec<u8>>,
    /// Image attachment contents keyed by stored name
    pub images: HashMap<String, Vec<u8>>,
}

impl ExportAssets {
    pub async fn load(repo: &Repository, reports: &[Report], logo_path: &Path) -> Self {
        let logo = match tokio::fs::read(logo_path).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No logo at {}, pages get no header", logo_path.display());
                None
            }
            Err(err) => {
                warn!("Failed to read logo {}: {}", logo_path.display(), err);
                None
            }
        };

        let mut images = HashMap::new();
        for report in reports {
            for attachment in report.fields.attachments.iter().filter(|a| a.is_image()) {
                let Some(stored_name) = attachment.stored_name() else {
                    warn!(
                        "Image {:?} on report {} has no stored file, skipping",
                        attachment.name, report.id
                    );
                    continue;
                };
                if images.contains_key(stored_name) {
                    continue;
                }
                match repo.attachments().resolve(stored_name).await {
                    Ok(Some(bytes)) => {
                        images.insert(stored_name.to_string(), bytes);
                    }
                    Ok(None) => warn!(
                        "Attachment file {} for report {} is missing, skipping",
                        stored_name, report.id
                    ),
                    Err(err) => warn!(
                        "Failed to read attachment {} for report {}: {}",
                        stored_name, report.id, err
                    ),
                }
            }
        }
        Self { logo, images }
    }
}

/// Lays out every report, each starting on a fresh page.
pub fn render_reports(
    reports: &[Report],
    assets: &ExportAssets,
    generated_at: DateTime<Utc>,
) -> Result<Document, HazardError> {
    let logo = match assets.logo.as_deref().map(PdfImage::decode) {
        Some(Ok(img)) => Some(img),
        Some(Err(err)) => {
            warn!("Logo not added to PDF header: {}", err);
            None
        }
        None => None,
    };
    let generated = generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let mut canvas = PdfCanvas::new(logo.as_ref())?;
    for (idx, report) in reports.iter().enumerate() {
        if idx > 0 {
            canvas.add_page()?;
        }
        render_report(&mut canvas, report, assets, &generated)?;
    }
    canvas.finish()
}

fn render_report(
    canvas: &mut PdfCanvas,
    report: &Report,
    assets: &ExportAssets,
    generated: &str,
) -> Result<(), HazardError> {
    let fields = &report.fields;
    let details = TextStyle::new(Font::Regular, 12.0);
    let heading = TextStyle::new(Font::Regular, 12.0).underline();
    let body = TextStyle::new(Font::Regular, 10.0);

    canvas.text(
        &format!("Report ID: {}", report.id),
        &TextStyle::new(Font::Bold, 14.0),
    )?;
    canvas.move_down(0.5);

    let risk = fields.risk_level.map(|r| r.to_string()).unwrap_or_default();
    for line in [
        format!("Applicant: {}", fields.applicant_name),
        format!("Inspection Date: {}", fields.inspection_date),
        format!("District: {}", fields.district),
        format!("GN Division: {}", fields.gn_division),
        format!("Risk Level: {}", risk),
    ] {
        canvas.text(&line, &details)?;
    }
    canvas.move_down(0.5);

    canvas.text("Observations:", &heading)?;
    canvas.text(&fields.observations, &body)?;
    canvas.move_down(0.5);
    canvas.text("Recommendation:", &heading)?;
    canvas.text(&fields.recommendation, &body)?;
    canvas.move_down(0.7);

    if !fields.attachments.is_empty() {
        canvas.text("Attachments:", &heading)?;
        for attachment in &fields.attachments {
            if !attachment.is_image() {
                let style = body.clone().color(LINK_BLUE).link(attachment.url.clone());
                canvas.text(attachment.label(), &style)?;
                continue;
            }
            let Some(bytes) = attachment
                .stored_name()
                .and_then(|name| assets.images.get(name))
            else {
                continue;
            };
            match PdfImage::decode(bytes) {
                Ok(img) => {
                    canvas.move_down(0.2);
                    canvas.image(&img, IMAGE_BOX_WIDTH, IMAGE_BOX_HEIGHT)?;
                    canvas.move_down(0.2);
                }
                Err(err) => warn!(
                    "Failed to add attachment {:?} of report {} to PDF: {}",
                    attachment.name, report.id, err
                ),
            }
        }
    }

    let footer = TextStyle::new(Font::Regular, 9.0).color(GRAY);
    canvas.footer(
        &format!("Report ID: {} • Generated: {}", report.id, generated),
        &format!("Page {}", canvas.page_number()),
        FOOTER_OFFSET,
        &footer,
    );
    Ok(())
}

/// `std::io::Write` over a channel, handing the body out in chunks.
///
/// Runs on a blocking thread; `blocking_send` parks it while the client is slow.
pub(crate) struct ChannelWriter {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    pub(crate) fn new(tx: mpsc::Sender<Result<Bytes, io::Error>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(STREAM_CHUNK),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(STREAM_CHUNK),
        ));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body was dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= STREAM_CHUNK {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Serialises `doc` on a blocking thread, the receiver yields the body.
pub(crate) fn stream_document(mut doc: Document) -> ReceiverStream<Result<Bytes, io::Error>> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);
    tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter::new(tx.clone());
        let result = match doc.save_to(&mut writer) {
            Ok(()) => writer.flush().map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        if let Err(err) = result {
            error!("PDF stream failed: {}", err);
            // the error item ends the body instead of leaving it hanging
            let _ = tx.blocking_send(Err(io::Error::other(format!(
                "PDF generation failed: {}",
                err
            ))));
        }
    });
    ReceiverStream::new(rx)
}

/// Requested reports in request order; unknown ids are skipped.
pub(crate) async fn resolve_reports(
    repo: &Repository,
    request: &ExportRequest,
) -> Result<Vec<Report>, HazardError> {
    let mut stored = repo.list().await?;
    let mut found = Vec::new();
    for id in request.requested_ids() {
        match stored.iter().position(|report| report.id == id) {
            Some(idx) => found.push(stored.swap_remove(idx)),
            None => debug!("Export skipping unknown report {}", id),
        }
    }
    Ok(found)
}

#[utoipa::path(
    post,
    path = "/api/export/pdf",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "PDF of the matching reports, streamed as application/pdf"),
        (status = 401, description = "Missing or wrong api key", body = ErrorResponse),
        (status = 404, description = "None of the ids matched a report", body = ErrorResponse),
        (status = 500, description = "The PDF couldn't be built", body = ErrorResponse)
    ),
    tag = "export",
    security(("api_key" = []))
)]
pub async fn export_pdf(
    State(state): State<SharedState>,
    body: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, WebError> {
    let request = json_body(body)?;
    let (repo, logo_path) = {
        let state = state.read().await;
        (state.repo.clone(), state.config.logo_path.clone())
    };

    let reports = resolve_reports(&repo, &request).await?;
    if reports.is_empty() {
        return Err(WebError::not_found("No reports found"));
    }
    let assets = ExportAssets::load(&repo, &reports, &logo_path).await;

    let ids: Vec<i64> = reports.iter().map(|report| report.id).collect();
    let doc = tokio::task::spawn_blocking(move || render_reports(&reports, &assets, Utc::now()))
        .await
        .map_err(|err| {
            error!("PDF render task failed: {:?}", err);
            WebError::internal("Failed to generate PDF")
        })?
        .map_err(|err| {
            error!("Failed to generate PDF: {:?}", err);
            WebError::internal("Failed to generate PDF")
        })?;
    info!("Exporting {} report(s) to PDF: {:?}", ids.len(), ids);

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
            ),
        ],
        Body::from_stream(stream_document(doc)),
    )
        .into_response())
}
