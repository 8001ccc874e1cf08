//! Object-store entity tags computed locally.
//!
//! The store reports an entity tag for every object: the MD5 of the body for
//! single-request uploads, and `md5(md5(part 1) ‖ … ‖ md5(part n))-n` for
//! multipart uploads. Computing the same value for a local file lets the sync
//! skip files whose content is already in place.

use md5::{Digest, Md5};

/// Incrementally computes the entity tag a file will have once uploaded.
///
/// Files larger than `multipart_threshold` are assumed to be uploaded in
/// `part_size` chunks; everything else in a single request.
#[derive(Debug, Clone)]
pub struct EtagBuilder {
    part_size: u64,
    multipart_threshold: u64,
    whole: Md5,
    current_part: Md5,
    current_part_len: u64,
    part_digests: Vec<u8>,
    parts: u64,
    total: u64,
}

impl EtagBuilder {
    /// A builder for uploads split into `part_size` chunks above `multipart_threshold` bytes.
    ///
    /// A zero `part_size` is treated as one byte.
    pub fn new(part_size: u64, multipart_threshold: u64) -> Self {
        Self {
            part_size: part_size.max(1),
            multipart_threshold,
            whole: Md5::new(),
            current_part: Md5::new(),
            current_part_len: 0,
            part_digests: Vec::new(),
            parts: 0,
            total: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.whole.update(data);
        self.total += data.len() as u64;

        while !data.is_empty() {
            let room = (self.part_size - self.current_part_len) as usize;
            let take = room.min(data.len());
            self.current_part.update(&data[..take]);
            self.current_part_len += take as u64;
            data = &data[take..];

            if self.current_part_len == self.part_size {
                self.close_part();
            }
        }
    }

    /// The entity tag, without quotes.
    pub fn finish(mut self) -> String {
        if self.total <= self.multipart_threshold {
            return hex::encode(self.whole.finalize());
        }
        if self.current_part_len > 0 {
            self.close_part();
        }
        let combined = Md5::digest(&self.part_digests);
        format!("{}-{}", hex::encode(combined), self.parts)
    }

    fn close_part(&mut self) {
        let digest = std::mem::replace(&mut self.current_part, Md5::new()).finalize();
        self.part_digests.extend_from_slice(&digest);
        self.parts += 1;
        self.current_part_len = 0;
    }
}

/// Entity tag of a body uploaded in a single request.
pub fn single_part_etag(body: &[u8]) -> String {
    hex::encode(Md5::digest(body))
}

/// Entity tag of an object assembled from `parts`, in part-number order.
pub fn multipart_etag<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut digests = Vec::new();
    let mut count = 0usize;
    for part in parts {
        digests.extend_from_slice(&Md5::digest(part));
        count += 1;
    }
    format!("{}-{}", hex::encode(Md5::digest(&digests)), count)
}

/// Strips the quotes stores put around entity tags.
pub fn normalize_etag(raw: &str) -> String {
    raw.trim_matches('"').to_string()
}
