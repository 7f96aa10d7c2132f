use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use parking_lot::Mutex;
use rtsp::MediaSink;

use crate::Input;

/// Annex-B start code written before every NAL unit.
const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// `.264` elementary stream file shared by every connection attempt.
#[derive(Clone)]
pub struct AnnexBWriter {
    file: Arc<Mutex<BufWriter<File>>>,
}

impl AnnexBWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    fn write_nals<'a>(&self, nals: impl IntoIterator<Item = &'a [u8]>) -> io::Result<()> {
        let mut file = self.file.lock();
        for nal in nals {
            file.write_all(&START_CODE)?;
            file.write_all(nal)?;
        }
        file.flush()
    }
}

/// Sink for one connection: writes to the shared file and reports progress
/// to the supervisor loop.
pub struct CaptureSink {
    writer: AnnexBWriter,
    progress: Sender<Input>,
}

impl CaptureSink {
    pub fn new(writer: AnnexBWriter, progress: Sender<Input>) -> Self {
        Self { writer, progress }
    }
}

impl MediaSink for CaptureSink {
    fn on_sps_pps(&mut self, sps: &[u8], pps: &[u8]) {
        if let Err(e) = self.writer.write_nals([sps, pps]) {
            tracing::warn!(error = %e, "failed to write SPS/PPS");
        }
    }

    fn on_nal_group(&mut self, nals: Vec<Vec<u8>>) {
        if let Err(e) = self.writer.write_nals(nals.iter().map(Vec::as_slice)) {
            tracing::warn!(error = %e, "failed to write NAL group");
        }
        let _ = self.progress.send(Input::Frame);
    }
}
