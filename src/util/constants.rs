/// Max bytes accepted for one NDJSON line.
pub const RECV_BUFFER_LIMIT: usize = 512 * 1024;
