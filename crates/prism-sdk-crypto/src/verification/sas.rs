// Copyright 2024 The prism-sdk Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Short-authentication-string byte packing: the emoji table and the
//! decimal/emoji bit-packing functions. These are Matrix-spec constants,
//! not design choices, and are carried over unchanged.

/// One of the 64 emoji/description pairs the spec assigns to a 6-bit index.
///
/// # Panics
///
/// Panics if `index` is not in `0..64`; the spec defines exactly 64.
pub fn emoji_from_index(index: u8) -> (&'static str, &'static str) {
    match index {
        0 => ("🐶", "Dog"),
        1 => ("🐱", "Cat"),
        2 => ("🦁", "Lion"),
        3 => ("🐎", "Horse"),
        4 => ("🦄", "Unicorn"),
        5 => ("🐷", "Pig"),
        6 => ("🐘", "Elephant"),
        7 => ("🐰", "Rabbit"),
        8 => ("🐼", "Panda"),
        9 => ("🐓", "Rooster"),
        10 => ("🐧", "Penguin"),
        11 => ("🐢", "Turtle"),
        12 => ("🐟", "Fish"),
        13 => ("🐙", "Octopus"),
        14 => ("🦋", "Butterfly"),
        15 => ("🌷", "Flower"),
        16 => ("🌳", "Tree"),
        17 => ("🌵", "Cactus"),
        18 => ("🍄", "Mushroom"),
        19 => ("🌏", "Globe"),
        20 => ("🌙", "Moon"),
        21 => ("☁️", "Cloud"),
        22 => ("🔥", "Fire"),
        23 => ("🍌", "Banana"),
        24 => ("🍎", "Apple"),
        25 => ("🍓", "Strawberry"),
        26 => ("🌽", "Corn"),
        27 => ("🍕", "Pizza"),
        28 => ("🎂", "Cake"),
        29 => ("❤️", "Heart"),
        30 => ("😀", "Smiley"),
        31 => ("🤖", "Robot"),
        32 => ("🎩", "Hat"),
        33 => ("👓", "Glasses"),
        34 => ("🔧", "Spanner"),
        35 => ("🎅", "Santa"),
        36 => ("👍", "Thumbs up"),
        37 => ("☂️", "Umbrella"),
        38 => ("⌛", "Hourglass"),
        39 => ("⏰", "Clock"),
        40 => ("🎁", "Gift"),
        41 => ("💡", "Light Bulb"),
        42 => ("📕", "Book"),
        43 => ("✏️", "Pencil"),
        44 => ("📎", "Paperclip"),
        45 => ("✂️", "Scissors"),
        46 => ("🔒", "Lock"),
        47 => ("🔑", "Key"),
        48 => ("🔨", "Hammer"),
        49 => ("☎️", "Telephone"),
        50 => ("🏁", "Flag"),
        51 => ("🚂", "Train"),
        52 => ("🚲", "Bicycle"),
        53 => ("✈️", "Airplane"),
        54 => ("🚀", "Rocket"),
        55 => ("🏆", "Trophy"),
        56 => ("⚽", "Ball"),
        57 => ("🎸", "Guitar"),
        58 => ("🎺", "Trumpet"),
        59 => ("🔔", "Bell"),
        60 => ("⚓", "Anchor"),
        61 => ("🎧", "Headphones"),
        62 => ("📁", "Folder"),
        63 => ("📌", "Pin"),
        _ => panic!("emoji index outside the allowed 0..64 range"),
    }
}

/// Unpack 6 bytes of SAS material into 7 six-bit indices, per the
/// [Matrix spec's emoji SAS method][spec].
///
/// [spec]: https://spec.matrix.org/latest/client-server-api/#sas-method-emoji
pub fn bytes_to_emoji_index(bytes: &[u8; 6]) -> [u8; 7] {
    let bytes: Vec<u64> = bytes.iter().map(|b| *b as u64).collect();
    let mut num: u64 = bytes[0] << 40;
    num += bytes[1] << 32;
    num += bytes[2] << 24;
    num += bytes[3] << 16;
    num += bytes[4] << 8;
    num += bytes[5];

    [
        ((num >> 42) & 63) as u8,
        ((num >> 36) & 63) as u8,
        ((num >> 30) & 63) as u8,
        ((num >> 24) & 63) as u8,
        ((num >> 18) & 63) as u8,
        ((num >> 12) & 63) as u8,
        ((num >> 6) & 63) as u8,
    ]
}

/// Resolve 6 bytes of SAS material to 7 emoji/description pairs.
pub fn bytes_to_emoji(bytes: &[u8; 6]) -> Vec<(String, String)> {
    bytes_to_emoji_index(bytes)
        .into_iter()
        .map(|index| {
            let (emoji, description) = emoji_from_index(index);
            (emoji.to_owned(), description.to_owned())
        })
        .collect()
}

/// Unpack 5 bytes of SAS material into three 4-digit decimal numbers, per
/// the [Matrix spec's decimal SAS method][spec].
///
/// [spec]: https://spec.matrix.org/latest/client-server-api/#sas-method-decimal
pub fn bytes_to_decimal(bytes: &[u8; 5]) -> (u16, u16, u16) {
    let bytes: Vec<u16> = bytes.iter().map(|b| *b as u16).collect();

    let first = bytes[0] << 5 | bytes[1] >> 3;
    let second = (bytes[1] & 0x7) << 10 | bytes[2] << 2 | bytes[3] >> 6;
    let third = (bytes[3] & 0x3F) << 7 | bytes[4] >> 1;

    (first + 1000, second + 1000, third + 1000)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::{bytes_to_decimal, bytes_to_emoji};

    #[test]
    fn decimal_generation_matches_spec_example() {
        let bytes = [0x83, 0x71, 0x77, 0xc8, 0x80];
        let result = bytes_to_decimal(&bytes);
        assert_eq!(result, (5206, 2503, 2088));
    }

    #[test]
    fn emoji_generation_produces_seven_pairs() {
        let bytes = [0x83, 0x71, 0x77, 0xc8, 0x80, 0x00];
        let result = bytes_to_emoji(&bytes);
        assert_eq!(result.len(), 7);
    }

    proptest! {
        #[test]
        fn decimal_stays_in_spec_range(bytes in prop::array::uniform5(0u8..)) {
            let (first, second, third) = bytes_to_decimal(&bytes);
            prop_assert!((1000..=9191).contains(&first));
            prop_assert!((1000..=9191).contains(&second));
            prop_assert!((1000..=9191).contains(&third));
        }
    }
}
