use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Opaque session description, exchanged as offer then answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One possible network path, in the same JSON shape browsers use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSender {
    pub display_name: String,
    pub uid: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOffer {
    pub file_name: String,
    pub file_size: u64,
    pub from_user: OfferSender,
}

/// Application-level signal carried inside a [`SignalEnvelope`].
///
/// On the wire the variants are told apart by shape rather than by a common
/// tag: negotiation messages carry `type`, descriptions carry `sdp` and
/// candidates carry `candidate`. The serde representation maps between the
/// two so the rest of the crate only ever sees the enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireSignal", into = "WireSignal")]
pub enum SignalPayload {
    FileOffer(FileOffer),
    FileAccept,
    FileDecline,
    SessionDescription(SessionDescription),
    ConnectivityCandidate(IceCandidate),
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::FileOffer(_) => "file-offer",
            SignalPayload::FileAccept => "file-accept",
            SignalPayload::FileDecline => "file-decline",
            SignalPayload::SessionDescription(_) => "session-description",
            SignalPayload::ConnectivityCandidate(_) => "connectivity-candidate",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireSignal {
    Negotiation(NegotiationSignal),
    Description(DescriptionSignal),
    Candidate(CandidateSignal),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum NegotiationSignal {
    FileOffer(FileOffer),
    FileAccept,
    FileDecline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptionSignal {
    sdp: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CandidateSignal {
    candidate: IceCandidate,
}

impl From<WireSignal> for SignalPayload {
    fn from(wire: WireSignal) -> Self {
        match wire {
            WireSignal::Negotiation(NegotiationSignal::FileOffer(offer)) => {
                SignalPayload::FileOffer(offer)
            }
            WireSignal::Negotiation(NegotiationSignal::FileAccept) => SignalPayload::FileAccept,
            WireSignal::Negotiation(NegotiationSignal::FileDecline) => SignalPayload::FileDecline,
            WireSignal::Description(d) => SignalPayload::SessionDescription(d.sdp),
            WireSignal::Candidate(c) => SignalPayload::ConnectivityCandidate(c.candidate),
        }
    }
}

impl From<SignalPayload> for WireSignal {
    fn from(payload: SignalPayload) -> Self {
        match payload {
            SignalPayload::FileOffer(offer) => {
                WireSignal::Negotiation(NegotiationSignal::FileOffer(offer))
            }
            SignalPayload::FileAccept => WireSignal::Negotiation(NegotiationSignal::FileAccept),
            SignalPayload::FileDecline => WireSignal::Negotiation(NegotiationSignal::FileDecline),
            SignalPayload::SessionDescription(sdp) => {
                WireSignal::Description(DescriptionSignal { sdp })
            }
            SignalPayload::ConnectivityCandidate(candidate) => {
                WireSignal::Candidate(CandidateSignal { candidate })
            }
        }
    }
}

/// Addressed signal published on the relay. Every subscriber receives it;
/// only the one whose identity equals `to` acts on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub to: PeerId,
    pub from: PeerId,
    pub signal: SignalPayload,
}

impl SignalEnvelope {
    pub fn new(to: PeerId, from: PeerId, signal: SignalPayload) -> Self {
        Self { to, from, signal }
    }
}
