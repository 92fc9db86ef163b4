use common::{AudioDayStat, AudioStats, SourceDayStat, SourcesStats};

use crate::error::LibraryError;
use crate::store::Store;

const AUDIO_BY_DAY: &str = "
    SELECT DATE(downloaded_at) AS day, COUNT(*)
    FROM audio_files
    WHERE downloaded_at IS NOT NULL
    GROUP BY day
    ORDER BY day";

// A source is dated by the earliest download among the files it produced.
const SOURCES_BY_FIRST_DAY: &str = "
    SELECT DATE(s.first_seen) AS day, f.name
    FROM (
        SELECT source_path, MIN(downloaded_at) AS first_seen
        FROM audio_files
        WHERE downloaded_at IS NOT NULL AND source_path IS NOT NULL
        GROUP BY source_path
    ) s
    JOIN folders f ON f.path = s.source_path
    ORDER BY day, f.name";

pub fn audio_stats(store: &Store) -> Result<AudioStats, LibraryError> {
    let conn = store.conn()?;
    let mut stmt = conn.prepare(AUDIO_BY_DAY)?;
    let rows = stmt.query_map([], |row| {
        Ok(AudioDayStat {
            date: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            count: row.get(1)?,
        })
    })?;

    let mut stats = AudioStats::default();
    for day in rows {
        let day = day?;
        // DATE() yields NULL for values it cannot parse.
        if day.date.is_empty() {
            continue;
        }
        stats.total += day.count;
        stats.days.push(day);
    }
    Ok(stats)
}

pub fn sources_stats(store: &Store) -> Result<SourcesStats, LibraryError> {
    let conn = store.conn()?;
    let mut stmt = conn.prepare(SOURCES_BY_FIRST_DAY)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            row.get::<_, String>(1)?,
        ))
    })?;

    let mut stats = SourcesStats::default();
    for row in rows {
        let (date, name) = row?;
        if date.is_empty() {
            continue;
        }
        stats.total += 1;
        match stats.days.last_mut() {
            Some(day) if day.date == date => {
                day.count += 1;
                day.sources.push(name);
            }
            _ => stats.days.push(SourceDayStat {
                date,
                count: 1,
                sources: vec![name],
            }),
        }
    }
    Ok(stats)
}
