/*!
# FITS primary image

Reader and writer of the primary HDU of [FITS] files, enough to load the actuator mapping of a DM.

The header is a sequence of 80 characters cards packed into blocks of 2880 bytes and ended by the `END` card.
The data unit follows the header, starting at the next block boundary, with the samples stored in big-endian order
and `NAXIS1` being the fastest varying axis.
The physical value of a sample is `BZERO + BSCALE * sample`.

[FITS]: https://fits.gsfc.nasa.gov/fits_standard.html
*/

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

const BLOCK: usize = 2880;
const CARD: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum FitsError {
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error("not a FITS file, the first keyword is not SIMPLE")]
    NotFits,
    #[error("the header has no END card")]
    MissingEnd,
    #[error("missing keyword {0}")]
    MissingKeyword(String),
    #[error("invalid value {1:?} for keyword {0}")]
    InvalidValue(String, String),
    #[error("unsupported BITPIX value: {0}")]
    Bitpix(i64),
    #[error("the data unit is truncated")]
    Truncated,
    #[error("image shape {0:?} is too large")]
    TooLarge(Vec<usize>),
    #[error("image shape {shape:?} does not match the data length {len}")]
    Shape { shape: Vec<usize>, len: usize },
}
type Result<T> = std::result::Result<T, FitsError>;

/// Sample type of the data unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitpix {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}
impl Bitpix {
    fn value(self) -> i64 {
        match self {
            Bitpix::U8 => 8,
            Bitpix::I16 => 16,
            Bitpix::I32 => 32,
            Bitpix::I64 => 64,
            Bitpix::F32 => -32,
            Bitpix::F64 => -64,
        }
    }
    fn n_byte(self) -> usize {
        (self.value().unsigned_abs() / 8) as usize
    }
    fn decode(self, bytes: &[u8]) -> Vec<f64> {
        macro_rules! decode {
            ($t:ty) => {
                bytes
                    .chunks_exact(std::mem::size_of::<$t>())
                    .map(|b| {
                        let mut buf = [0u8; std::mem::size_of::<$t>()];
                        buf.copy_from_slice(b);
                        <$t>::from_be_bytes(buf) as f64
                    })
                    .collect()
            };
        }
        match self {
            Bitpix::U8 => bytes.iter().map(|&b| b as f64).collect(),
            Bitpix::I16 => decode!(i16),
            Bitpix::I32 => decode!(i32),
            Bitpix::I64 => decode!(i64),
            Bitpix::F32 => decode!(f32),
            Bitpix::F64 => decode!(f64),
        }
    }
    fn encode(self, data: &[f64]) -> Vec<u8> {
        match self {
            Bitpix::U8 => data.iter().map(|&x| x as u8).collect(),
            Bitpix::I16 => data.iter().flat_map(|&x| (x as i16).to_be_bytes()).collect(),
            Bitpix::I32 => data.iter().flat_map(|&x| (x as i32).to_be_bytes()).collect(),
            Bitpix::I64 => data.iter().flat_map(|&x| (x as i64).to_be_bytes()).collect(),
            Bitpix::F32 => data.iter().flat_map(|&x| (x as f32).to_be_bytes()).collect(),
            Bitpix::F64 => data.iter().flat_map(|&x| x.to_be_bytes()).collect(),
        }
    }
}
impl TryFrom<i64> for Bitpix {
    type Error = FitsError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            8 => Ok(Bitpix::U8),
            16 => Ok(Bitpix::I16),
            32 => Ok(Bitpix::I32),
            64 => Ok(Bitpix::I64),
            -32 => Ok(Bitpix::F32),
            -64 => Ok(Bitpix::F64),
            _ => Err(FitsError::Bitpix(value)),
        }
    }
}

/// Header keyword/value pairs
#[derive(Debug, Default)]
struct Header(Vec<(String, String)>);
impl Header {
    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut cards = vec![];
        let mut block = [0u8; BLOCK];
        loop {
            reader.read_exact(&mut block).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => FitsError::MissingEnd,
                _ => e.into(),
            })?;
            for card in block.chunks_exact(CARD) {
                let card = String::from_utf8_lossy(card);
                let keyword = card.get(..8).unwrap_or_default().trim_end();
                if cards.is_empty() && keyword != "SIMPLE" {
                    return Err(FitsError::NotFits);
                }
                if keyword == "END" {
                    return Ok(Self(cards));
                }
                if card.get(8..10) == Some("= ") {
                    let value = card.get(10..).unwrap_or_default();
                    let value = value
                        .split_once('/')
                        .map_or(value, |(value, _comment)| value)
                        .trim();
                    cards.push((keyword.to_string(), value.to_string()));
                }
            }
        }
    }
    fn get(&self, keyword: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == keyword)
            .map(|(_, value)| value.as_str())
    }
    fn parse<T: std::str::FromStr>(&self, keyword: &str) -> Result<Option<T>> {
        self.get(keyword)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| FitsError::InvalidValue(keyword.into(), value.into()))
            })
            .transpose()
    }
    fn required<T: std::str::FromStr>(&self, keyword: &str) -> Result<T> {
        self.parse(keyword)?
            .ok_or_else(|| FitsError::MissingKeyword(keyword.into()))
    }
}

fn card(keyword: &str, value: &str) -> String {
    format!("{:<8}= {:>20}{:width$}", keyword, value, "", width = CARD - 30)
}

/// Number of samples of an image of size `shape`, `None` on overflow
fn n_sample(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |n, &m| n.checked_mul(m))
}

/// Primary image of a FITS file
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    shape: Vec<usize>,
    data: Vec<f64>,
}
impl Image {
    /// Creates a new image
    ///
    /// `shape` is `[NAXIS1, NAXIS2, ...]`
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        if n_sample(&shape) != Some(data.len()) {
            return Err(FitsError::Shape {
                shape,
                len: data.len(),
            });
        }
        Ok(Self { shape, data })
    }
    /// Reads the primary image of a FITS file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(&mut BufReader::new(file))
    }
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let header = Header::read(reader)?;
        let bitpix = Bitpix::try_from(header.required::<i64>("BITPIX")?)?;
        let naxis: usize = header.required("NAXIS")?;
        let shape = (1..=naxis)
            .map(|i| header.required::<usize>(&format!("NAXIS{i}")))
            .collect::<Result<Vec<usize>>>()?;
        let bscale = header.parse::<f64>("BSCALE")?.unwrap_or(1.);
        let bzero = header.parse::<f64>("BZERO")?.unwrap_or(0.);

        let n_byte = if naxis == 0 {
            Some(0)
        } else {
            n_sample(&shape).and_then(|n| n.checked_mul(bitpix.n_byte()))
        }
        .ok_or_else(|| FitsError::TooLarge(shape.clone()))?;
        // the buffer only grows with the bytes actually read
        let mut bytes = vec![];
        reader.take(n_byte as u64).read_to_end(&mut bytes)?;
        if bytes.len() < n_byte {
            return Err(FitsError::Truncated);
        }
        let data = bitpix
            .decode(&bytes)
            .into_iter()
            .map(|x| bzero + bscale * x)
            .collect();
        Ok(Self { shape, data })
    }
    /// Writes the image into a FITS file with samples of type `bitpix`
    pub fn save<P: AsRef<Path>>(&self, path: P, bitpix: Bitpix) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_writer(&mut writer, bitpix)?;
        writer.flush()?;
        Ok(())
    }
    pub fn to_writer<W: Write>(&self, writer: &mut W, bitpix: Bitpix) -> Result<()> {
        let mut header = vec![
            card("SIMPLE", "T"),
            card("BITPIX", &bitpix.value().to_string()),
            card("NAXIS", &self.shape.len().to_string()),
        ];
        header.extend(
            self.shape
                .iter()
                .enumerate()
                .map(|(i, n)| card(&format!("NAXIS{}", i + 1), &n.to_string())),
        );
        header.push(format!("{:<width$}", "END", width = CARD));
        let mut header = header.concat().into_bytes();
        header.resize(header.len().div_ceil(BLOCK) * BLOCK, b' ');
        writer.write_all(&header)?;

        let mut data = bitpix.encode(&self.data);
        data.resize(data.len().div_ceil(BLOCK) * BLOCK, 0u8);
        writer.write_all(&data)?;
        Ok(())
    }
    /// Image axes size `[NAXIS1, NAXIS2, ...]`
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
    /// Image samples with `NAXIS1` as the fastest varying axis
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_width() {
        assert_eq!(card("NAXIS1", "11").len(), CARD);
        assert_eq!(&card("BITPIX", "-64")[..10], "BITPIX  = ");
    }

    #[test]
    fn integer_image() {
        let image = Image::new(vec![3, 2], vec![0., 1., 2., -3., 4., 5.]).unwrap();
        let mut buffer = vec![];
        image.to_writer(&mut buffer, Bitpix::I16).unwrap();
        assert_eq!(buffer.len(), 2 * BLOCK);
        let decoded = Image::from_reader(&mut buffer.as_slice()).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn scaled_samples() {
        let mut header: String = [
            card("SIMPLE", "T"),
            card("BITPIX", "8"),
            card("NAXIS", "1"),
            card("NAXIS1", "3"),
            format!("{:<80}", "BZERO   =                 -1.0 / offset"),
            card("BSCALE", "2.0"),
            format!("{:<80}", "END"),
        ]
        .concat();
        header.push_str(&" ".repeat(BLOCK - header.len()));
        let mut bytes = header.into_bytes();
        bytes.extend([0u8, 1, 2]);
        let image = Image::from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(image.data(), &[-1., 1., 3.]);
    }

    #[test]
    fn truncated_data() {
        let image = Image::new(vec![4, 4], vec![1.; 16]).unwrap();
        let mut buffer = vec![];
        image.to_writer(&mut buffer, Bitpix::F64).unwrap();
        buffer.truncate(BLOCK + 10);
        assert!(matches!(
            Image::from_reader(&mut buffer.as_slice()),
            Err(FitsError::Truncated)
        ));
    }

    fn header(cards: &[(&str, &str)]) -> Vec<u8> {
        let mut header: String = cards
            .iter()
            .map(|(keyword, value)| card(keyword, value))
            .chain(Some(format!("{:<80}", "END")))
            .collect();
        header.push_str(&" ".repeat(BLOCK - header.len()));
        header.into_bytes()
    }

    #[test]
    fn overflowing_shape() {
        let bytes = header(&[
            ("SIMPLE", "T"),
            ("BITPIX", "-64"),
            ("NAXIS", "2"),
            ("NAXIS1", "8589934592"),
            ("NAXIS2", "2147483648"),
        ]);
        assert!(matches!(
            Image::from_reader(&mut bytes.as_slice()),
            Err(FitsError::TooLarge(_))
        ));
    }

    #[test]
    fn huge_shape_with_short_data() {
        let mut bytes = header(&[
            ("SIMPLE", "T"),
            ("BITPIX", "-64"),
            ("NAXIS", "2"),
            ("NAXIS1", "1000000"),
            ("NAXIS2", "1000000"),
        ]);
        bytes.extend([0u8; 64]);
        assert!(matches!(
            Image::from_reader(&mut bytes.as_slice()),
            Err(FitsError::Truncated)
        ));
    }

    #[test]
    fn not_fits() {
        let bytes = vec![b' '; BLOCK];
        assert!(matches!(
            Image::from_reader(&mut bytes.as_slice()),
            Err(FitsError::NotFits)
        ));
    }

    #[test]
    fn shape_mismatch() {
        assert!(Image::new(vec![2, 2], vec![0.; 3]).is_err());
    }
}
