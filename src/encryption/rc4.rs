// RC4 is not provided by the RustCrypto block-cipher crates we depend on, and the algorithm is
// small enough to keep here.
use super::EncryptionError;
use zeroize::Zeroize;

pub struct Rc4 {
    initial_state: [u8; 256],
}

impl Rc4 {
    /// Runs the key schedule. Keys must be 1 to 256 bytes long.
    pub fn new<Key: AsRef<[u8]>>(key: Key) -> Result<Self, EncryptionError> {
        let key = key.as_ref();
        if key.is_empty() || key.len() > 256 {
            return Err(EncryptionError::CipherInitialization("RC4 key must be 1 to 256 bytes long"));
        }

        let mut initial_state = [0_u8; 256];
        for (i, v) in initial_state.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut j = 0_u8;
        for i in 0..256 {
            j = j.wrapping_add(initial_state[i]).wrapping_add(key[i % key.len()]);
            initial_state.swap(i, j as usize);
        }

        Ok(Self { initial_state })
    }

    /// Encrypts/decrypts `input` into `output`.  The shorter of `input` and `output`
    ///  determine how many bytes are written into `output`.
    pub fn apply_keystream<'i, 'o, Input, Output>(&self, input: Input, output: Output)
    where
        Input: Iterator<Item = &'i u8>,
        Output: Iterator<Item = &'o mut u8>,
    {
        let mut state = self.initial_state;
        let mut i = 0_u8;
        let mut j = 0_u8;
        for (i_byte, o_byte) in input.zip(output) {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[i as usize]);
            state.swap(i as usize, j as usize);
            let key_byte = state[(state[i as usize].wrapping_add(state[j as usize])) as usize];
            *o_byte = i_byte ^ key_byte;
        }
        state.zeroize();
    }

    /// Allocates a new Vec<u8> of the same length as `input` and encrypts
    ///  `input` into it.
    pub fn encrypt<Input>(&self, input: Input) -> Vec<u8>
    where
        Input: AsRef<[u8]>,
    {
        let input = input.as_ref();
        let mut output = vec![0; input.len()];
        self.apply_keystream(input.iter(), output.iter_mut());
        output
    }

    /// Allocates a new Vec<u8> of the same length as `input` and decrypts
    ///  `input` into it.
    pub fn decrypt<Input>(&self, input: Input) -> Vec<u8>
    where
        Input: AsRef<[u8]>,
    {
        // Rc4 is symmetric
        self.encrypt(input)
    }
}

impl Drop for Rc4 {
    fn drop(&mut self) {
        self.initial_state.zeroize();
    }
}
