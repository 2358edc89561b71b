pub mod validators;
pub mod vocab;

pub use vocab::{
    check_from_dataset, check_from_dict, check_from_file, check_from_list,
    check_unique_list_of_words,
};
