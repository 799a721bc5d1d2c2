use crate::message::ChatMessage;
use crate::timeline::TimelineReconciler;
use thiserror::Error;

/// Why a submit turned into a no-op. Never shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejection {
    #[error("message is empty after trimming")]
    Blank,
    #[error("a send is already in flight")]
    InFlight,
}

/// Latch that admits one outbound chat message at a time.
///
/// The latch is taken by [`SendGuard::begin`] and held until the owner calls
/// [`SendGuard::release`], which the client does once the transport has
/// written the frame (or the link is gone).
#[derive(Debug, Default)]
pub struct SendGuard {
    in_flight: bool,
}

impl SendGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn check(&self, text: &str) -> Result<(), SubmitRejection> {
        if text.trim().is_empty() {
            return Err(SubmitRejection::Blank);
        }
        if self.in_flight {
            return Err(SubmitRejection::InFlight);
        }
        Ok(())
    }

    /// Takes the latch and builds the outbound message. The body is kept
    /// exactly as typed.
    pub fn begin(
        &mut self,
        text: &str,
        reconciler: &mut TimelineReconciler,
    ) -> Result<ChatMessage, SubmitRejection> {
        self.check(text)?;
        self.in_flight = true;
        let sender = reconciler.identity().as_str().to_string();
        Ok(ChatMessage::new(reconciler.next_id(), sender, text))
    }

    pub fn release(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SessionIdentity;

    #[test]
    fn blank_text_is_rejected_without_taking_latch() {
        let mut guard = SendGuard::new();
        let mut r = TimelineReconciler::new(SessionIdentity::new("A"));
        for text in ["", "   ", "\t\n"] {
            assert_eq!(guard.begin(text, &mut r), Err(SubmitRejection::Blank));
        }
        assert!(!guard.is_in_flight());
        assert!(r.timeline().is_empty());
    }

    #[test]
    fn second_begin_waits_for_release() {
        let mut guard = SendGuard::new();
        let mut r = TimelineReconciler::new(SessionIdentity::new("A"));

        let first = guard.begin("hi", &mut r).unwrap();
        assert_eq!(first.sender, "A");
        assert_eq!(first.body, "hi");
        assert!(guard.is_in_flight());

        assert_eq!(guard.begin("again", &mut r), Err(SubmitRejection::InFlight));

        guard.release();
        let second = guard.begin("again", &mut r).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn body_keeps_surrounding_whitespace() {
        let mut guard = SendGuard::new();
        let mut r = TimelineReconciler::new(SessionIdentity::new("A"));
        let message = guard.begin("  padded ", &mut r).unwrap();
        assert_eq!(message.body, "  padded ");
    }
}
