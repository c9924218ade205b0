/// Defines protocol phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn accepts_touch(&self) -> bool;
    fn next(&self) -> Option<Self>;

    fn is_welcome(&self) -> bool {
        false
    }
    fn is_threshold(&self) -> bool {
        false
    }
    fn is_reaching(&self) -> bool {
        false
    }
    fn is_debrief(&self) -> bool {
        false
    }
}

#[derive(Copy, Debug, Clone, PartialEq)]
pub enum ProtocolPhase {
    Welcome,
    Threshold,
    Reaching,
    Debrief,
}

impl Default for ProtocolPhase {
    fn default() -> Self {
        ProtocolPhase::Welcome
    }
}

impl Phase for ProtocolPhase {
    fn accepts_touch(&self) -> bool {
        matches!(self, Self::Threshold | Self::Reaching)
    }
    fn next(&self) -> Option<Self> {
        use ProtocolPhase::*;
        Some(match self {
            Welcome => Threshold,
            Threshold => Reaching,
            Reaching => Debrief,
            Debrief => return None,
        })
    }

    fn is_welcome(&self) -> bool {
        matches!(self, ProtocolPhase::Welcome)
    }

    fn is_threshold(&self) -> bool {
        matches!(self, ProtocolPhase::Threshold)
    }

    fn is_reaching(&self) -> bool {
        matches!(self, ProtocolPhase::Reaching)
    }

    fn is_debrief(&self) -> bool {
        matches!(self, ProtocolPhase::Debrief)
    }
}
