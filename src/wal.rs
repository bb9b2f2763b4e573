use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const HEADER_LEN: usize = 4;
const TRAILER_LEN: usize = 4;

/// Frame one event as a complete WAL entry: `[u32 len][bincode][u32 crc32]`.
/// `len` counts the bincode payload only.
fn frame(event: &Event) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut entry = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    entry.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    entry.extend_from_slice(&payload);
    entry.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(entry)
}

/// Decode the entry starting at `buf[at..]`. Returns the event and the
/// offset just past it. `None` means the tail from `at` on is truncated
/// (crash mid-append) or corrupt, and replay must stop there.
fn decode_entry(buf: &[u8], at: usize) -> Option<(Event, usize)> {
    let header: [u8; 4] = buf.get(at..at + HEADER_LEN)?.try_into().ok()?;
    let len = u32::from_le_bytes(header) as usize;

    let payload_at = at + HEADER_LEN;
    let crc_at = payload_at.checked_add(len)?;
    let payload = buf.get(payload_at..crc_at)?;

    let trailer: [u8; 4] = buf.get(crc_at..crc_at + TRAILER_LEN)?.try_into().ok()?;
    if u32::from_le_bytes(trailer) != crc32fast::hash(payload) {
        return None;
    }

    let event = bincode::deserialize(payload).ok()?;
    Some((event, crc_at + TRAILER_LEN))
}

/// Append-only log of booking events, the engine's only durable state.
///
/// Appends are buffered; the group-commit writer calls `flush_sync` once
/// per batch so a whole batch shares one fsync. A partially written final
/// entry (crash) fails its length or CRC check on replay and is dropped.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffered append + fsync in one call. Test convenience; the engine
    /// batches `append_buffered` calls and syncs once.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one entry without syncing. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.writer.write_all(&frame(event)?)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered entries and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Phase one of compaction: write the snapshot events to a sibling
    /// temp file and fsync it. Pure I/O, safe to run while appends are
    /// still being buffered elsewhere.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for event in events {
            writer.write_all(&frame(event)?)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Phase two: rename the temp file over the log and reopen for append.
    /// The rename is atomic, so a crash leaves either the old or the new
    /// log intact, never a mix.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Both compaction phases back to back. Test convenience.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read back every intact entry. A missing file is an empty log;
    /// decoding stops silently at the first truncated or corrupt entry.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let buf = match fs::read(path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut events = Vec::new();
        let mut at = 0;
        while let Some((event, next)) = decode_entry(&buf, at) {
            events.push(event);
            at = next;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CancelReason, Stay};
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("vacancy_test_wal");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn hotel_event() -> Event {
        Event::HotelCreated {
            id: Ulid::new(),
            name: "Harbor View".into(),
            city: "Lisbon".into(),
            star_rating: Some(4),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let _ = fs::remove_file(&path);

        let events = vec![
            hotel_event(),
            Event::CategoryCreated {
                id: Ulid::new(),
                hotel_id: Ulid::new(),
                name: "Double".into(),
                total_capacity: 4,
                price_per_night: 9900,
                amenities: vec!["wifi".into()],
            },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_handles_truncation() {
        let path = tmp_path("truncation.wal");
        let _ = fs::remove_file(&path);

        let event = hotel_event();

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }

        // Simulate a crash mid-append: a second entry that stops after a
        // few bytes.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![event]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let _ = fs::remove_file(&path);
        let replayed = Wal::replay(&path).unwrap();
        assert!(replayed.is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = tmp_path("corrupt_crc.wal");
        let _ = fs::remove_file(&path);

        let event = Event::HotelDeleted { id: Ulid::new() };

        // Hand-write an entry whose CRC doesn't match the payload.
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert!(replayed.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_reduces_wal() {
        let path = tmp_path("compact_reduce.wal");
        let _ = fs::remove_file(&path);

        let category_id = Ulid::new();
        let created = Event::HotelCreated {
            id: Ulid::new(),
            name: "Station Inn".into(),
            city: "Porto".into(),
            star_rating: None,
        };

        // Heavy churn: bookings created and cancelled over and over.
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&created).unwrap();
            for _ in 0..10 {
                let bid = Ulid::new();
                wal.append(&Event::BookingCreated {
                    id: bid,
                    category_id,
                    guest_id: Ulid::new(),
                    stay: Stay::new(d(2024, 6, 1), d(2024, 6, 4)),
                    created_at: chrono::Utc::now(),
                })
                .unwrap();
                wal.append(&Event::BookingCancelled {
                    id: bid,
                    category_id,
                    reason: CancelReason::Guest,
                })
                .unwrap();
            }
        }

        let before = fs::metadata(&path).unwrap().len();
        assert!(before > 0);

        // Compacted state: just the hotel.
        let compacted_events = vec![created];

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(&compacted_events).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, compacted_events);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let _ = fs::remove_file(&path);

        let compacted = vec![hotel_event()];
        let new_event = Event::CategoryDeleted { id: Ulid::new() };

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&compacted[0]).unwrap();
            wal.compact(&compacted).unwrap();
            wal.append(&new_event).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![compacted[0].clone(), new_event]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = tmp_path("buffered_flush.wal");
        let _ = fs::remove_file(&path);

        let events: Vec<Event> = (0..5).map(|_| hotel_event()).collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, events);

        let _ = fs::remove_file(&path);
    }
}
