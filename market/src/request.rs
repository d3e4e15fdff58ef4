//! 连续历史请求。
//!
//! 单次历史请求的跨度有限，这里把截止时间不断前移，直到覆盖 `start`。

use chrono::{DateTime, Utc};
use ratchet::{AgentError, Bar, Instrument};

use crate::source::{BarSource, HistoricalRequest};

const MAX_PAGES: usize = 10_000;

/// 向前分页请求历史 bar，返回 `start` 之后（含）按时间升序去重的结果。
pub fn request_consecutive<S: BarSource + ?Sized>(
	source: &mut S,
	instrument: &Instrument,
	request: &HistoricalRequest,
	start: DateTime<Utc>,
) -> Result<Vec<Bar>, AgentError> {
	let mut pages: Vec<Vec<Bar>> = Vec::new();
	let mut end = request.end;

	for _ in 0..MAX_PAGES {
		let page = source.request_historical(
			instrument,
			&HistoricalRequest {
				end,
				keep_up_to_date: false,
				..*request
			},
		)?;
		let Some(earliest) = page.iter().map(|bar| bar.datetime).min() else {
			break;
		};
		pages.push(page);

		// 无进展时停止，避免同一窗口被反复请求
		if earliest <= start || end == Some(earliest) {
			break;
		}
		end = Some(earliest);
	}

	tracing::debug!(
		instrument = %instrument.id,
		pages = pages.len(),
		start = %start,
		"consecutive historical request finished"
	);

	let mut bars = pages
		.into_iter()
		.rev()
		.flatten()
		.filter(|bar| bar.datetime >= start)
		.collect::<Vec<_>>();
	bars.sort_by_key(|bar| bar.datetime);
	bars.dedup_by_key(|bar| bar.datetime);
	Ok(bars)
}
