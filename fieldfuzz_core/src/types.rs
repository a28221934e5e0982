use serde::Serialize;

/// A generated message ready to be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzedMessage {
    /// message type name
    pub name: String,
    /// human readable representation of the frame
    pub summary: String,
    /// the bytes that go on the wire
    pub raw: Vec<u8>,
}

/// One entry of a job's crash log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashRecord {
    /// job that sent the message
    pub job_id: usize,
    /// description of the transport the message was sent over
    pub transport: String,
    /// human readable representation of the message
    pub message: String,
    /// raw bytes of the message
    pub raw: Vec<u8>,
}
