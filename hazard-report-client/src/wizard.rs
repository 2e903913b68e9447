//! The six-step report wizard
//!
//! Each step gates `next()` on its own rules, `back()` never validates, and
//! `submit()` checks the whole draft again before anything is sent. Every
//! change goes through the attached [DraftSaver], so the saved draft follows
//! the wizard without the caller having to remember.

use hazard_report_shared::attachment::Attachment;
use hazard_report_shared::report::{ReportFields, RiskLevel};
use hazard_report_shared::validation::{validate_report, Step};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ReportApi;
use crate::draft::{DraftSaver, DraftSnapshot};
use crate::error::ClientError;

/// An attachment as the wizard sees it, possibly still uploading.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftAttachment {
    /// Identifies the placeholder while its upload is in flight
    pub local_id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub uploading: bool,
    /// 0-100
    pub progress: u8,
    /// What the server confirmed, `None` until the upload finishes
    pub attachment: Option<Attachment>,
}

/// Everything typed into the wizard so far.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportDraft {
    pub applicant_name: String,
    pub inspection_date: String,
    pub district: String,
    pub ds_division: String,
    pub gn_division: String,
    pub observations: String,
    pub risk_level: Option<RiskLevel>,
    pub recommendation: String,
    pub attachments: Vec<DraftAttachment>,
}

impl ReportDraft {
    /// The report as it would be submitted; unfinished uploads are left out.
    pub fn to_fields(&self) -> ReportFields {
        ReportFields {
            applicant_name: self.applicant_name.clone(),
            inspection_date: self.inspection_date.clone(),
            district: self.district.clone(),
            ds_division: self.ds_division.clone(),
            gn_division: self.gn_division.clone(),
            observations: self.observations.clone(),
            risk_level: self.risk_level,
            recommendation: self.recommendation.clone(),
            attachments: self
                .attachments
                .iter()
                .filter_map(|a| a.attachment.clone())
                .collect(),
        }
    }

    pub fn uploads_in_progress(&self) -> usize {
        self.attachments.iter().filter(|a| a.uploading).count()
    }
}

pub struct ReportWizard {
    step: Step,
    draft: ReportDraft,
    next_local_id: u64,
    saver: Option<DraftSaver>,
}

impl Default for ReportWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportWizard {
    pub fn new() -> Self {
        Self {
            step: Step::General,
            draft: ReportDraft::default(),
            next_local_id: 1,
            saver: None,
        }
    }

    /// Every later change schedules a save through `saver`.
    pub fn with_saver(mut self, saver: DraftSaver) -> Self {
        self.saver = Some(saver);
        self
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn draft(&self) -> &ReportDraft {
        &self.draft
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            report_data: self.draft.clone(),
            step: self.step,
        }
    }

    fn changed(&self) {
        if let Some(saver) = &self.saver {
            saver.schedule(self.snapshot());
        }
    }

    /// Edit the draft in place.
    pub fn update(&mut self, edit: impl FnOnce(&mut ReportDraft)) {
        edit(&mut self.draft);
        self.changed();
    }

    /// Picks up a saved draft where it was left.
    pub fn restore(&mut self, snapshot: DraftSnapshot) {
        self.draft = snapshot.report_data;
        // uploads don't survive a restart
        self.draft.attachments.retain(|a| !a.uploading);
        self.next_local_id = self
            .draft
            .attachments
            .iter()
            .map(|a| a.local_id + 1)
            .max()
            .unwrap_or(1);
        self.step = snapshot.step;
        self.changed();
    }

    /// Current-step rules that aren't met yet.
    pub fn violations(&self) -> Vec<String> {
        self.step.violations(&self.draft.to_fields())
    }

    /// Advances one step if the current one is complete.
    pub fn next(&mut self) -> Result<Step, ClientError> {
        let violations = self.violations();
        if !violations.is_empty() {
            debug!("Step {} incomplete: {:?}", self.step.number(), violations);
            return Err(ClientError::Validation(violations));
        }
        if let Some(next) = self.step.next() {
            self.step = next;
            self.changed();
        }
        Ok(self.step)
    }

    /// Goes back one step, stopping at the first.
    pub fn back(&mut self) -> Step {
        if let Some(prev) = self.step.prev() {
            self.step = prev;
            self.changed();
        }
        self.step
    }

    /// The fields to send, if the whole draft is valid and nothing is still uploading.
    pub fn prepare_submit(&self) -> Result<ReportFields, ClientError> {
        let fields = self.draft.to_fields();
        validate_report(&fields).map_err(ClientError::Validation)?;
        if self.draft.uploads_in_progress() > 0 {
            return Err(ClientError::Validation(vec![
                "Wait for attachments to finish uploading".to_string(),
            ]));
        }
        Ok(fields)
    }

    fn reset(&mut self) {
        self.step = Step::General;
        self.draft = ReportDraft::default();
        self.next_local_id = 1;
    }

    /// Starts over after report `id` was created; the saved draft is dropped in the background.
    pub fn finish_submit(&mut self, id: i64) {
        debug!("Report {} created, starting a new draft", id);
        self.reset();
        if let Some(saver) = &self.saver {
            saver.discard();
        }
    }

    /// Re-validates everything, creates the report and starts over.
    pub async fn submit(&mut self, api: &dyn ReportApi) -> Result<i64, ClientError> {
        let fields = self.prepare_submit()?;
        let id = api.create_report(&fields).await?;
        info!("Submitted report {}", id);

        self.reset();
        if let Some(saver) = &self.saver {
            if let Err(err) = saver.clear().await {
                warn!("Failed to remove the saved draft: {}", err);
            }
        }
        Ok(id)
    }

    /// Adds a placeholder for a file about to be uploaded, returning its local id.
    pub fn begin_upload(&mut self, name: &str, content_type: &str, size: u64) -> u64 {
        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.draft.attachments.push(DraftAttachment {
            local_id,
            name: name.to_string(),
            content_type: content_type.to_string(),
            size,
            uploading: true,
            progress: 0,
            attachment: None,
        });
        self.changed();
        local_id
    }

    fn placeholder_mut(&mut self, local_id: u64) -> Option<&mut DraftAttachment> {
        self.draft
            .attachments
            .iter_mut()
            .find(|a| a.local_id == local_id)
    }

    /// `false` if the placeholder is gone.
    pub fn set_progress(&mut self, local_id: u64, progress: u8) -> bool {
        let Some(placeholder) = self.placeholder_mut(local_id) else {
            return false;
        };
        placeholder.progress = progress.min(100);
        self.changed();
        true
    }

    /// Swaps the placeholder for the server's record, keeping its position.
    pub fn complete_upload(&mut self, local_id: u64, attachment: Attachment) -> bool {
        let Some(placeholder) = self.placeholder_mut(local_id) else {
            warn!("Upload {} finished but its placeholder is gone", local_id);
            return false;
        };
        placeholder.name = attachment.name.clone();
        placeholder.content_type = attachment.content_type.clone();
        placeholder.size = attachment.size;
        placeholder.uploading = false;
        placeholder.progress = 100;
        placeholder.attachment = Some(attachment);
        self.changed();
        true
    }

    /// Drops the placeholder of a failed upload.
    pub fn fail_upload(&mut self, local_id: u64) -> Option<DraftAttachment> {
        let idx = self
            .draft
            .attachments
            .iter()
            .position(|a| a.local_id == local_id)?;
        let removed = self.draft.attachments.remove(idx);
        self.changed();
        Some(removed)
    }

    /// Takes a finished attachment off the draft, e.g. after deleting it on the server.
    pub fn remove_attachment(&mut self, local_id: u64) -> Option<DraftAttachment> {
        self.fail_upload(local_id)
    }
}
