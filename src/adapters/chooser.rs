use crate::domain::model::{PortDescriptor, PortId};
use crate::domain::ports::PortChooser;
use async_trait::async_trait;

/// Picks the first negotiated candidate; the default for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCandidate;

#[async_trait]
impl PortChooser for FirstCandidate {
    async fn choose(&self, candidates: &[PortDescriptor]) -> Option<PortId> {
        candidates.first().map(|candidate| candidate.id.clone())
    }
}

/// Picks one specific port, declining if it is not among the candidates.
#[derive(Debug, Clone)]
pub struct ById(pub PortId);

#[async_trait]
impl PortChooser for ById {
    async fn choose(&self, candidates: &[PortDescriptor]) -> Option<PortId> {
        candidates
            .iter()
            .find(|candidate| candidate.id == self.0)
            .map(|candidate| candidate.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::PortInfo;

    fn candidates() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::new("A", PortInfo::usb(0x1, 0x2)),
            PortDescriptor::new("B", PortInfo::default()),
        ]
    }

    #[tokio::test]
    async fn test_first_candidate() {
        assert_eq!(
            FirstCandidate.choose(&candidates()).await,
            Some(PortId::new("A"))
        );
        assert_eq!(FirstCandidate.choose(&[]).await, None);
    }

    #[tokio::test]
    async fn test_by_id() {
        let chooser = ById(PortId::new("B"));
        assert_eq!(chooser.choose(&candidates()).await, Some(PortId::new("B")));

        let chooser = ById(PortId::new("C"));
        assert_eq!(chooser.choose(&candidates()).await, None);
    }
}
