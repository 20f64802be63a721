//! Copying a message into the duck pond.
//!
//! Every delivery is attempted independently. A failed text post does not
//! stop attachments from going out, and one lost attachment does not stop
//! the others.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::channels::{MessageStore, ProxyChannel};
use crate::error::RelayError;
use crate::pond::model::{Attachment, Message, Notice, NoticeColour, ProxyIdentity};

/// Headroom left under the upload limit for the rest of the multipart body.
const UPLOAD_LEEWAY: u64 = 512;

pub const IRRETRIEVABLE_ATTACHMENT: &str =
    ":x: **This message contained an attachment, but it could not be retrieved**";

pub const LARGE_ATTACHMENTS_FOOTER: &str = "Attachments exceed upload size limit.";

/// What a relay actually delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub text_delivered: bool,
    pub attachments_delivered: usize,
    /// Attachments posted as links because they were too large to upload.
    pub attachments_linked: usize,
    pub notices_delivered: usize,
    pub failures: usize,
}

/// Posts a message's text and files to the destination as its author.
pub struct Relayer {
    store: Arc<dyn MessageStore>,
    proxy: Arc<dyn ProxyChannel>,
    upload_limit: u64,
}

impl Relayer {
    pub fn new(store: Arc<dyn MessageStore>, proxy: Arc<dyn ProxyChannel>, upload_limit: u64) -> Self {
        Self {
            store,
            proxy,
            upload_limit,
        }
    }

    /// Relay `message`. Never fails as a whole; failures are logged and
    /// tallied in the report.
    pub async fn relay(&self, message: &Message) -> RelayReport {
        let identity = ProxyIdentity::of(&message.author);
        let mut report = RelayReport::default();

        if !message.content.is_empty() {
            match self.proxy.send_text(&message.content, &identity).await {
                Ok(()) => report.text_delivered = true,
                Err(e) => {
                    error!(message_id = message.id, error = %e, "Failed to relay message text");
                    report.failures += 1;
                }
            }
        }

        let mut too_large: Vec<&Attachment> = Vec::new();

        for attachment in &message.attachments {
            if attachment.size > self.upload_limit.saturating_sub(UPLOAD_LEEWAY) {
                too_large.push(attachment);
                continue;
            }

            match self.transfer(attachment, &identity).await {
                Ok(()) => report.attachments_delivered += 1,
                Err(RelayError::PayloadTooLarge { .. }) => too_large.push(attachment),
                Err(e @ RelayError::AuthorizationLost { .. }) => {
                    warn!(
                        message_id = message.id,
                        attachment = %attachment.filename,
                        error = %e,
                        "Attachment irretrievable, posting notice instead"
                    );
                    self.notify(&irretrievable_notice(), &identity, &mut report)
                        .await;
                }
                Err(e) => {
                    error!(
                        message_id = message.id,
                        attachment = %attachment.filename,
                        error = %e,
                        "Failed to relay attachment"
                    );
                    report.failures += 1;
                }
            }
        }

        if !too_large.is_empty() {
            let before = report.notices_delivered;
            self.notify(&large_attachments_notice(&too_large), &identity, &mut report)
                .await;
            if report.notices_delivered > before {
                report.attachments_linked = too_large.len();
            }
        }

        info!(
            message_id = message.id,
            author = %identity.display_name,
            text = report.text_delivered,
            attachments = report.attachments_delivered,
            linked = report.attachments_linked,
            notices = report.notices_delivered,
            failures = report.failures,
            "Relayed message to duck pond"
        );

        report
    }

    async fn transfer(
        &self,
        attachment: &Attachment,
        identity: &ProxyIdentity,
    ) -> Result<(), RelayError> {
        let bytes = self.store.download_attachment(attachment).await?;
        self.proxy
            .send_attachment(&attachment.filename, bytes, identity)
            .await
    }

    async fn notify(&self, notice: &Notice, identity: &ProxyIdentity, report: &mut RelayReport) {
        match self.proxy.send_notice(notice, identity).await {
            Ok(()) => report.notices_delivered += 1,
            Err(e) => {
                error!(error = %e, "Failed to post notice to duck pond");
                report.failures += 1;
            }
        }
    }
}

fn irretrievable_notice() -> Notice {
    Notice {
        description: IRRETRIEVABLE_ATTACHMENT.to_string(),
        footer: None,
        colour: NoticeColour::Error,
    }
}

fn large_attachments_notice(attachments: &[&Attachment]) -> Notice {
    let description = attachments
        .iter()
        .map(|a| format!("[{}]({})", a.filename, a.url))
        .collect::<Vec<_>>()
        .join("\n");

    Notice {
        description,
        footer: Some(LARGE_ATTACHMENTS_FOOTER.to_string()),
        colour: NoticeColour::Neutral,
    }
}
