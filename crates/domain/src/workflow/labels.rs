use serde::Serialize;

use super::{WorkflowAction, WorkflowStage};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct StageLabel {
    pub label: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct ActionLabel {
    pub label: &'static str,
    pub icon: &'static str,
}

pub fn stage_label(stage: WorkflowStage) -> StageLabel {
    let (label, description) = match stage {
        WorkflowStage::Draft => ("Taslak", "Başvuru henüz tamamlanmadı"),
        WorkflowStage::Submitted => ("Gönderildi", "Başvuru inceleme için bekliyor"),
        WorkflowStage::UnderReview => ("İnceleniyor", "Başvuru değerlendiriliyor"),
        WorkflowStage::NeedsInfo => ("Bilgi Bekleniyor", "Ek bilgi/belge gerekli"),
        WorkflowStage::Approved => ("Onaylandı", "Başvuru onaylandı, dağıtım bekliyor"),
        WorkflowStage::Rejected => ("Reddedildi", "Başvuru reddedildi"),
        WorkflowStage::InDistribution => ("Dağıtımda", "Yardım dağıtılıyor"),
        WorkflowStage::Completed => ("Tamamlandı", "Yardım teslim edildi"),
    };
    StageLabel { label, description }
}

pub fn action_label(action: WorkflowAction) -> ActionLabel {
    let (label, icon) = match action {
        WorkflowAction::Submit => ("Gönder", "send"),
        WorkflowAction::StartReview => ("İncelemeye Al", "eye"),
        WorkflowAction::RequestInfo => ("Bilgi İste", "help-circle"),
        WorkflowAction::ProvideInfo => ("Bilgi Gönder", "file-plus"),
        WorkflowAction::Approve => ("Onayla", "check-circle"),
        WorkflowAction::Reject => ("Reddet", "x-circle"),
        WorkflowAction::StartDistribution => ("Dağıtıma Başla", "truck"),
        WorkflowAction::Complete => ("Tamamla", "check-square"),
        WorkflowAction::Reopen => ("Yeniden Aç", "refresh-cw"),
    };
    ActionLabel { label, icon }
}

pub fn stage_labels() -> Vec<(WorkflowStage, StageLabel)> {
    WorkflowStage::ALL
        .into_iter()
        .map(|stage| (stage, stage_label(stage)))
        .collect()
}

pub fn action_labels() -> Vec<(WorkflowAction, ActionLabel)> {
    WorkflowAction::ALL
        .into_iter()
        .map(|action| (action, action_label(action)))
        .collect()
}
