use std::{
    convert::Infallible,
    fmt,
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

use serde::{Deserialize, Serialize};

/// Rango `[byte_start, byte_end)` de un archivo, alineado a líneas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub file_path: String,
    pub byte_start: u64,
    pub byte_end: u64,
}

impl ChunkDescriptor {
    pub fn len(&self) -> u64 {
        self.byte_end - self.byte_start
    }

    pub fn is_empty(&self) -> bool {
        self.byte_end <= self.byte_start
    }

    /// Cuerpo de `POST /work` para este chunk.
    pub fn to_request(&self) -> WorkRequest {
        WorkRequest {
            filepath: self.file_path.clone(),
            start: self.byte_start,
            size: self.len(),
        }
    }
}

impl fmt::Display for ChunkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{})", self.file_path, self.byte_start, self.byte_end)
    }
}

/// Body de `POST /work`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub filepath: String,
    pub start: u64,
    pub size: u64,
}

impl WorkRequest {
    pub fn to_chunk(&self) -> ChunkDescriptor {
        ChunkDescriptor {
            file_path: self.filepath.clone(),
            byte_start: self.start,
            byte_end: self.start.saturating_add(self.size),
        }
    }
}

/* ---------------- planner ---------------- */

/// Divide `[0, file_size)` en chunks contiguos que nunca cortan una línea.
///
/// `line_locator(offset)` devuelve el primer inicio de línea `>= offset`
/// (o `file_size` si no hay más saltos de línea).
pub fn plan<F>(
    file_path: &str,
    file_size: u64,
    target_chunk_bytes: u64,
    mut line_locator: F,
) -> Vec<ChunkDescriptor>
where
    F: FnMut(u64) -> u64,
{
    let res: Result<_, Infallible> = try_plan(file_path, file_size, target_chunk_bytes, |off| {
        Ok(line_locator(off))
    });
    match res {
        Ok(chunks) => chunks,
        Err(never) => match never {},
    }
}

/// Igual que [`plan`] pero con un locator que puede fallar (I/O).
pub fn try_plan<F, E>(
    file_path: &str,
    file_size: u64,
    target_chunk_bytes: u64,
    mut line_locator: F,
) -> Result<Vec<ChunkDescriptor>, E>
where
    F: FnMut(u64) -> Result<u64, E>,
{
    let target = target_chunk_bytes.max(1);
    let mut chunks = Vec::new();
    let mut start = 0u64;

    while start < file_size {
        let proposed = start.saturating_add(target).min(file_size);

        let end = if proposed < file_size {
            // sólo hacia adelante: nunca un chunk vacío
            line_locator(proposed)?.clamp(proposed, file_size)
        } else {
            file_size
        };

        chunks.push(ChunkDescriptor {
            file_path: file_path.to_string(),
            byte_start: start,
            byte_end: end,
        });
        start = end;
    }

    Ok(chunks)
}

/// Planifica un archivo real: lee su tamaño y busca límites de línea en disco.
pub fn plan_file(path: &str, target_chunk_bytes: u64) -> io::Result<Vec<ChunkDescriptor>> {
    let mut locator = FileLineLocator::open(path)?;
    let size = locator.len();
    try_plan(path, size, target_chunk_bytes, |off| locator.next_line_start(off))
}

/* ---------------- locator sobre archivo ---------------- */

const SCAN_BLOCK: usize = 8 * 1024;

/// Busca inicios de línea leyendo el archivo hacia adelante en bloques.
pub struct FileLineLocator {
    file: File,
    len: u64,
    buf: Vec<u8>,
}

impl FileLineLocator {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            buf: vec![0; SCAN_BLOCK],
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Primer offset `>= offset` que es inicio de línea (o fin de archivo).
    pub fn next_line_start(&mut self, offset: u64) -> io::Result<u64> {
        if offset == 0 || offset >= self.len {
            return Ok(offset.min(self.len));
        }

        // el byte anterior decide: si es '\n', offset ya es inicio de línea
        let mut pos = offset - 1;
        self.file.seek(SeekFrom::Start(pos))?;

        loop {
            let n = self.file.read(&mut self.buf)?;
            if n == 0 {
                return Ok(self.len);
            }
            if let Some(i) = self.buf[..n].iter().position(|b| *b == b'\n') {
                return Ok(pos + i as u64 + 1);
            }
            pos += n as u64;
        }
    }
}
